//! Prompt text sent to the generator.
//!
//! Each builder asks for the exact line labels the extractor reads back
//! (`HP:`, `Option:`, `Roll:`, `Reward:` ...). Change one side, change both.

use crate::world::{Character, Story};
use std::fmt::Write;

/// Phrase every summary request contains. Test generators key on it.
pub const SUMMARY_MARKER: &str = "Summarize the following event";

/// Line the generator writes when the player gets away from a fight.
pub const ESCAPE_MARKER: &str = "You've escaped";

/// The pieces of the story most prompts need.
pub struct StoryContext {
    pub background: String,
    pub key_events: String,
    pub latest_event: String,
    pub latest_action: String,
    pub player: String,
    pub rules: String,
    pub attributes: Vec<String>,
}

impl StoryContext {
    pub fn from_story(story: &Story) -> Self {
        let key_events = if story.key_events().is_empty() {
            "None yet.".to_string()
        } else {
            story
                .key_events()
                .iter()
                .enumerate()
                .map(|(i, e)| format!("{}. {e}", i + 1))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Self {
            background: story.background().unwrap_or("").to_string(),
            key_events,
            latest_event: story.latest_event().unwrap_or("").to_string(),
            latest_action: story.latest_player_action().unwrap_or("").to_string(),
            player: story.player().summary(),
            rules: story.rule().describe(),
            attributes: story.rule().attributes().to_vec(),
        }
    }

    fn preamble(&self) -> String {
        format!(
            "Story background:\n{}\n\nKey events so far:\n{}\n\nThe player character:\n{}\n\nGame rules: {}\n\nMost recent event:\n{}\n",
            self.background, self.key_events, self.player, self.rules, self.latest_event
        )
    }
}

fn skill_format(story_rules: &str) -> String {
    format!(
        "New skill: <skill name> (<attribute>)\n\
         Description: <one sentence>\n\
         Effect: <how it changes rolls, following the rules: {story_rules}>"
    )
}

pub fn summary(event: &str) -> String {
    format!(
        "{SUMMARY_MARKER} in one or two sentences. Keep names, places and anything \
         the player gained or lost.\n\n{event}"
    )
}

pub fn classify(ctx: &StoryContext) -> String {
    format!(
        "You are deciding what kind of scene comes next in a role-playing game.\n\n\
         Most recent event:\n{}\n\nThe player then did: {}\n\n\
         Reply with exactly one of these keywords and nothing else:\n\
         Battle - the player starts or is drawn into a fight.\n\
         Encounter - an obstacle or challenge the player must overcome with a roll.\n\
         Casual Event - a small happening with a minor reward or penalty.\n\
         Trade - a chance to buy, sell or barter.\n\
         None - the story simply continues.",
        ctx.latest_event, ctx.latest_action
    )
}

pub fn opening_world(rules: &str, max_attribute_point: u32, attributes: &[String]) -> String {
    let mut attribute_lines = String::new();
    for attr in attributes {
        let _ = writeln!(attribute_lines, "{attr}: <0-{max_attribute_point}>");
    }
    format!(
        "Invent the setting for a new fantasy role-playing game. First write a short \
         background for the world (two paragraphs). Then offer four ready-made player \
         characters, each introduced by a line 'Character 1', 'Character 2', 'Character 3' \
         and 'Character 4', in this format:\n\n\
         Character N\n\
         Classtype: <class>\n\
         Race: <race>\n\
         {attribute_lines}\
         Alignment: <alignment>\n\
         Description: <one or two sentences>\n\n\
         Rules of the game: {rules}\n\
         End by asking the player to pick a character by number (1-4), or 0 to describe their own."
    )
}

pub fn custom_character(
    description: &str,
    rules: &str,
    max_attribute_point: u32,
    attributes: &[String],
) -> String {
    let mut attribute_lines = String::new();
    for attr in attributes {
        let _ = writeln!(attribute_lines, "{attr}: <0-{max_attribute_point}>");
    }
    format!(
        "The player describes the character they want to play:\n{description}\n\n\
         Turn this into a character sheet in exactly this format:\n\
         Classtype: <class>\n\
         Race: <race>\n\
         {attribute_lines}\
         Alignment: <alignment>\n\
         Description: <one or two sentences>\n\n\
         Rules of the game: {rules}"
    )
}

pub fn opening_story(background: &str, player: &Character) -> String {
    format!(
        "Background of the world:\n{background}\n\nThe player character:\n{}\n\n\
         Write the opening scene of the adventure in the second person, ending at a \
         moment where the player must decide what to do. Do not decide for them.",
        player.summary()
    )
}

pub fn resume_story(opening: &[String], recent: &[String], player: &Character) -> String {
    format!(
        "We are resuming a saved role-playing game.\n\nHow the story began:\n{}\n\n\
         The most recent part of the story:\n{}\n\nThe player character:\n{}\n\n\
         Briefly recap where the player stands and continue from the latest moment, \
         ending where the player must decide what to do.",
        opening.join("\n"),
        recent.join("\n"),
        player.summary()
    )
}

pub fn continuation(ctx: &StoryContext) -> String {
    format!(
        "{}\nThe player then did: {}\n\nContinue the story in the second person for one or two \
         paragraphs and stop where the player must act again.",
        ctx.preamble(),
        ctx.latest_action
    )
}

pub fn encounter_scene(ctx: &StoryContext) -> String {
    format!(
        "{}\nThe player then did: {}\n\nDescribe an obstacle or challenge the player now faces. \
         Do not resolve it and do not roll dice; end by asking what the player does.",
        ctx.preamble(),
        ctx.latest_action
    )
}

pub fn encounter_option(ctx: &StoryContext, action: &str) -> String {
    format!(
        "Most recent event:\n{}\n\nThe player wants to: {action}\n\nGame rules: {}\n\n\
         Turn the player's intent into one rollable option, choosing the attribute that fits \
         and a fair difficulty. Reply in exactly this format:\n\
         Option: <what the player attempts> (<attribute>)\n\
         Roll: Your dice total should be > <number>",
        ctx.latest_event, ctx.rules
    )
}

pub fn encounter_success(ctx: &StoryContext, option: &str) -> String {
    format!(
        "The player succeeded at: {option}\n\nDescribe the success in a short paragraph. \
         Then grant exactly one reward on its own line, one of:\n\
         Reward: Golds +<amount>\n\
         Reward: HP +<amount>\n\
         Reward: {}\n\n\
         Usually gold (about 60% of the time), sometimes HP (25%), rarely a new skill (15%).",
        skill_format(&ctx.rules)
    )
}

/// Why a battle started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleCause {
    /// The player picked the fight.
    Initiated,
    /// The player failed an encounter roll and the situation turned violent.
    FailedEncounter,
}

pub fn battle_scene(ctx: &StoryContext, cause: BattleCause) -> String {
    let lead = match cause {
        BattleCause::Initiated => format!(
            "The player then did: {}\n\nA battle begins.",
            ctx.latest_action
        ),
        BattleCause::FailedEncounter => format!(
            "The player tried: {}\nand failed. The situation turns into a battle.",
            ctx.latest_action
        ),
    };
    let mut attribute_lines = String::new();
    for attr in &ctx.attributes {
        let _ = writeln!(attribute_lines, "{attr}: <value>");
    }
    format!(
        "{}\n{lead}\n\nDescribe the enemy and the start of the fight, then give its stats \
         in exactly this format:\n\
         Enemy name: <name>\n\
         Classtype: <class>\n\
         Race: <race>\n\
         {attribute_lines}\
         HP: <number>\n\
         Description: <one sentence>\n\n\
         End by asking what the player does.",
        ctx.preamble()
    )
}

pub fn battle_option(ctx: &StoryContext, enemy: &Character, action: &str) -> String {
    format!(
        "A battle is under way against:\n{}\n\nThe player wants to: {action}\n\nGame rules: {}\n\n\
         Turn the player's intent into one rollable option, choosing the attribute that fits. \
         The enemy rolls the same attribute. Reply in exactly this format:\n\
         Option: <what the player attempts> (<attribute>)\n\
         Roll: Your dice total should be greater than the roll of {}",
        enemy.summary(),
        ctx.rules,
        enemy.name
    )
}

pub fn battle_hit(option: &str, enemy: &Character) -> String {
    format!(
        "In battle against {}, the player's attempt succeeded: {option}\n\n\
         Describe the result in a short paragraph. Then on its own line:\n\
         Damage: <damage dealt to {}>\n\
         If the player was trying to flee, write \"{ESCAPE_MARKER}\" instead of a damage line. \
         If the player was healing, write \"You've successfully healed. HP +<amount>\" instead.",
        enemy.name, enemy.name
    )
}

pub fn battle_miss(option: &str, enemy: &Character) -> String {
    format!(
        "In battle against {}, the player's attempt failed: {option}\n\n\
         Describe how {} strikes back in a short paragraph. Then on its own line:\n\
         Damage: <damage dealt to the player>",
        enemy.name, enemy.name
    )
}

pub fn battle_victory(ctx: &StoryContext, enemy: &Character) -> String {
    format!(
        "The player has defeated {}.\n\nDescribe the victory in a short paragraph. Then grant \
         exactly one reward on its own line, one of:\n\
         Reward: Golds +<amount>\n\
         Reward: HP +<amount>\n\
         Reward: {}\n\n\
         Usually a new skill (about 60% of the time), sometimes gold (30%), rarely HP (10%).",
        enemy.name,
        skill_format(&ctx.rules)
    )
}

pub fn casual_scene(ctx: &StoryContext) -> String {
    format!(
        "{}\nThe player then did: {}\n\nDescribe a small, everyday happening the player \
         stumbles into, and end by asking how they respond. Do not resolve it yet.",
        ctx.preamble(),
        ctx.latest_action
    )
}

pub fn casual_outcome(ctx: &StoryContext, action: &str) -> String {
    format!(
        "Most recent event:\n{}\n\nThe player responds: {action}\n\nGame rules: {}\n\n\
         Describe what happens in a short paragraph. If the player comes out ahead or behind, \
         add lines in exactly this format (omit any that do not apply):\n\
         Reward: Golds +<amount> or HP +<amount>\n\
         Penalty: Golds -<amount> or HP -<amount>\n\
         Reward: {}",
        ctx.latest_event,
        ctx.rules,
        skill_format(&ctx.rules)
    )
}

pub fn trade_scene(ctx: &StoryContext) -> String {
    format!(
        "{}\nThe player then did: {}\n\nA trader or other party offers a deal. Describe them \
         and list what is on offer, with prices in Golds. Skills may be offered too. End by \
         asking what the player wants to do.",
        ctx.preamble(),
        ctx.latest_action
    )
}

pub fn trade_outcome(ctx: &StoryContext, action: &str) -> String {
    format!(
        "Most recent event:\n{}\n\nThe player responds: {action}\n\nThe player currently has: {}\n\n\
         Resolve the trade in a short paragraph. If something changes hands, add lines in exactly \
         this format (omit any that do not apply):\n\
         You lose: Golds <amount> or HP <amount>\n\
         You gain: Golds <amount> or HP <amount>\n\
         You gain: {}",
        ctx.latest_event,
        ctx.player,
        skill_format(&ctx.rules)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::GameRule;

    fn story() -> Story {
        let mut story = Story::new(GameRule::default());
        story.add_event("The kingdom of Vael lies under snow.");
        story.add_event("Wolves howl nearby.");
        story.add_player_action("light a torch").unwrap();
        story
    }

    #[test]
    fn test_context_reads_story() {
        let ctx = StoryContext::from_story(&story());
        assert_eq!(ctx.background, "The kingdom of Vael lies under snow.");
        assert_eq!(ctx.latest_event, "Wolves howl nearby.");
        assert_eq!(ctx.latest_action, "light a torch");
        assert_eq!(ctx.key_events, "None yet.");
    }

    #[test]
    fn test_rules_are_live() {
        let mut story = story();
        story.rule_mut().update("dice_sides", "12").unwrap();
        let ctx = StoryContext::from_story(&story);
        assert!(encounter_option(&ctx, "climb").contains("12-sided"));
    }

    #[test]
    fn test_battle_scene_lists_attributes() {
        let ctx = StoryContext::from_story(&story());
        let prompt = battle_scene(&ctx, BattleCause::Initiated);
        for attr in ["Strength: <value>", "Charisma: <value>", "HP: <number>"] {
            assert!(prompt.contains(attr), "missing {attr}");
        }
    }

    #[test]
    fn test_summary_marker() {
        assert!(summary("x").contains(SUMMARY_MARKER));
    }
}
