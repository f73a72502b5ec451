//! Starting a story: a fresh world with character selection, or resuming a save.

use super::{Turn, TurnError};
use crate::extract::{attribute_values, find_ignore_case, labeled_value, section, ExtractionError};
use crate::prompts;
use crate::rules::GameRule;
use crate::world::Character;

/// Number of ready-made characters offered at the start.
pub const ROSTER_SIZE: u32 = 4;

/// Fill `player` from a generated character sheet.
///
/// Attribute values above the rule maximum are clamped. Nothing is changed
/// unless the whole sheet parses.
pub fn apply_sheet(player: &mut Character, text: &str, rule: &GameRule) -> Result<(), ExtractionError> {
    let classtype = labeled_value(text, "Classtype")?;
    let race = labeled_value(text, "Race")?;
    let alignment = labeled_value(text, "Alignment")?;
    let description = labeled_value(text, "Description").unwrap_or("N/A");
    let attributes = attribute_values(text, rule.attributes())?;

    player.classtype = classtype.to_string();
    player.race = race.to_string();
    player.alignment = alignment.to_string();
    player.description = description.to_string();
    for (name, value) in attributes {
        player.attributes.set(&name, value.min(rule.max_attribute_point()));
    }
    Ok(())
}

/// Split the opening text into the world background and the character roster.
fn split_world(text: &str) -> (&str, &str) {
    match find_ignore_case(text, "Character 1") {
        Some(at) if !text[..at].trim().is_empty() => (text[..at].trim(), text[at..].trim()),
        _ => (text.trim(), ""),
    }
}

async fn read_choice(turn: &mut Turn<'_>) -> Result<u32, TurnError> {
    loop {
        let Some(line) = turn
            .terminal
            .read_line("Choose a character (1-4), or 0 to describe your own: ")?
        else {
            return Err(TurnError::InputClosed);
        };
        match line.trim().parse::<u32>() {
            Ok(n) if n <= ROSTER_SIZE => return Ok(n),
            _ => turn.show("Invalid input. Please enter a number from 0 to 4."),
        }
    }
}

/// Generate a world, let the player pick or describe a character, and open the story.
pub async fn new_game(turn: &mut Turn<'_>, name: &str) -> Result<(), TurnError> {
    let rule = turn.story.rule().clone();
    let mut player = Character::new(name, &rule);
    turn.story.rule_mut().lock_attributes();

    let prompt = prompts::opening_world(&rule.describe(), rule.max_attribute_point(), rule.attributes());
    let world = turn.generate(prompt, true).await?;
    let (background, roster) = split_world(&world);
    turn.story.add_event(background);
    if !roster.is_empty() {
        turn.story.add_event(roster);
    }

    loop {
        let choice = read_choice(turn).await?;

        let sheet = if choice == 0 {
            let Some(description) = turn.terminal.read_line("Describe your character: ")? else {
                return Err(TurnError::InputClosed);
            };
            let prompt = prompts::custom_character(
                description.trim(),
                &rule.describe(),
                rule.max_attribute_point(),
                rule.attributes(),
            );
            turn.generate(prompt, true).await?
        } else {
            let start = format!("Character {choice}");
            let end = format!("Character {}", choice + 1);
            let end = (choice < ROSTER_SIZE).then_some(end.as_str());
            match section(roster, &start, end) {
                Ok(text) => text.to_string(),
                Err(e) => {
                    turn.show(&format!("[ERROR] {e}. Please choose again."));
                    continue;
                }
            }
        };

        match apply_sheet(&mut player, &sheet, &rule) {
            Ok(()) => break,
            Err(e) => {
                tracing::warn!(choice, error = %e, "Could not read character sheet");
                turn.show(&format!(
                    "[ERROR] Could not read that character ({e}). Please choose again."
                ));
            }
        }
    }

    tracing::info!(name = %player.name, classtype = %player.classtype, "Player character created");
    turn.story.set_player(player);
    let sheet = turn.story.player().to_string();
    turn.show(&format!("You have created your character:\n{sheet}"));
    if turn
        .terminal
        .read_line("Press Enter to start the story: ")?
        .is_none()
    {
        return Err(TurnError::InputClosed);
    }

    let prompt = prompts::opening_story(background, turn.story.player());
    turn.narrate(prompt).await?;
    turn.player_action().await?;
    Ok(())
}

/// Recap a loaded story from its first and last few entries and carry on.
pub async fn resume(turn: &mut Turn<'_>) -> Result<(), TurnError> {
    let history = turn.story.history();
    let opening: Vec<String> = history.iter().take(5).cloned().collect();
    let recent = history[history.len().saturating_sub(5)..].to_vec();

    let prompt = prompts::resume_story(&opening, &recent, turn.story.player());
    turn.narrate(prompt).await?;
    turn.player_action().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_world() {
        let text = "The realm of Vael.\n\nCharacter 1\nClasstype: Ranger";
        assert_eq!(split_world(text), ("The realm of Vael.", "Character 1\nClasstype: Ranger"));
        assert_eq!(split_world("Just a world."), ("Just a world.", ""));
    }

    #[test]
    fn test_apply_sheet_clamps() {
        let rule = GameRule::default();
        let mut player = Character::new("Mira", &rule);
        let text = "Classtype: Bard\nRace: Elf\nStrength: 1\nIntelligence: 3\nSpeed: 9\nCharisma: 6\n\
                    Alignment: chaotic good\nDescription: Sings.";
        apply_sheet(&mut player, text, &rule).unwrap();
        assert_eq!(player.classtype, "Bard");
        assert_eq!(player.attribute("Speed"), 6);
        assert_eq!(player.attribute("Charisma"), 6);
        assert_eq!(player.name, "Mira");
    }

    #[test]
    fn test_apply_sheet_is_all_or_nothing() {
        let rule = GameRule::default();
        let mut player = Character::new("Mira", &rule);
        let text = "Classtype: Bard\nRace: Elf\nAlignment: good\nStrength: 1";
        assert!(apply_sheet(&mut player, text, &rule).is_err());
        assert_eq!(player.classtype, "N/A");
    }
}
