//! Characters and the story log.

use crate::rules::GameRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Prefix that marks a player action in the story log.
pub const ACTION_PREFIX: &str = "You do: ";

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

/// A learned skill. Its effect text drives roll bonuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub description: String,
    pub effect: String,
}

/// Attribute values in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<(String, u32)>);

impl Attributes {
    /// Every attribute of `rule`, at zero.
    pub fn zeroed(rule: &GameRule) -> Self {
        Self(rule.attributes().iter().map(|a| (a.clone(), 0)).collect())
    }

    pub fn from_pairs(pairs: Vec<(String, u32)>) -> Self {
        Self(pairs)
    }

    /// Value of an attribute, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    pub fn set(&mut self, name: &str, value: u32) {
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A player character or NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub classtype: String,
    pub race: String,
    pub attributes: Attributes,
    pub alignment: String,
    pub skills: BTreeMap<String, Skill>,
    pub hp: i32,
    pub golds: i32,
    pub description: String,
}

impl Character {
    pub fn new(name: impl Into<String>, rule: &GameRule) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            classtype: "N/A".to_string(),
            race: "N/A".to_string(),
            attributes: Attributes::zeroed(rule),
            alignment: "neutral".to_string(),
            skills: BTreeMap::new(),
            hp: 100,
            golds: 100,
            description: "N/A".to_string(),
        }
    }

    pub fn attribute(&self, name: &str) -> u32 {
        self.attributes.get(name).unwrap_or(0)
    }

    /// Learn a skill, replacing one with the same name.
    pub fn learn(&mut self, name: impl Into<String>, skill: Skill) -> Option<Skill> {
        self.skills.insert(name.into(), skill)
    }

    /// Skills as `(name, effect)` pairs, the shape roll bonuses consume.
    pub fn skill_effects(&self) -> impl Iterator<Item = (&str, &str)> {
        self.skills
            .iter()
            .map(|(name, skill)| (name.as_str(), skill.effect.as_str()))
    }

    pub fn is_defeated(&self) -> bool {
        self.hp <= 0
    }

    /// One-paragraph summary used inside prompts.
    pub fn summary(&self) -> String {
        let attributes = self
            .attributes
            .iter()
            .map(|(n, v)| format!("{n} {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        let skills = if self.skills.is_empty() {
            "none".to_string()
        } else {
            self.skills
                .iter()
                .map(|(name, s)| format!("{name} ({})", s.effect))
                .collect::<Vec<_>>()
                .join("; ")
        };
        format!(
            "Name: {}. Classtype: {}. Race: {}. Attributes: {attributes}. Alignment: {}. \
             HP: {}. Golds: {}. Skills: {skills}. Description: {}",
            self.name, self.classtype, self.race, self.alignment, self.hp, self.golds, self.description
        )
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Classtype: {}", self.classtype)?;
        writeln!(f, "Race: {}", self.race)?;
        writeln!(f, "Attributes:")?;
        for (name, value) in self.attributes.iter() {
            writeln!(f, "  {name}: {value}")?;
        }
        writeln!(f, "Alignment: {}", self.alignment)?;
        writeln!(f, "HP: {}", self.hp)?;
        writeln!(f, "Golds: {}", self.golds)?;
        writeln!(f, "Skills:")?;
        if self.skills.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (name, skill) in &self.skills {
            writeln!(f, "  {name}: {}", skill.description)?;
            writeln!(f, "    Effect: {}", skill.effect)?;
        }
        write!(f, "Description: {}", self.description)
    }
}

/// Error type for story log invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    #[error("A player action cannot come before any narrative")]
    ActionBeforeNarrative,

    #[error("Player action is empty")]
    EmptyAction,
}

/// The running story: narrative log, key events, cast and rules.
#[derive(Debug, Clone)]
pub struct Story {
    history: Vec<String>,
    key_events: Vec<String>,
    player: Character,
    npcs: Vec<Character>,
    rule: GameRule,
}

impl Story {
    pub fn new(rule: GameRule) -> Self {
        Self {
            history: Vec::new(),
            key_events: Vec::new(),
            player: Character::new("Player", &rule),
            npcs: Vec::new(),
            rule,
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn key_events(&self) -> &[String] {
        &self.key_events
    }

    pub fn player(&self) -> &Character {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Character {
        &mut self.player
    }

    pub fn set_player(&mut self, player: Character) {
        self.player = player;
    }

    pub fn npcs(&self) -> &[Character] {
        &self.npcs
    }

    pub fn rule(&self) -> &GameRule {
        &self.rule
    }

    pub fn rule_mut(&mut self) -> &mut GameRule {
        &mut self.rule
    }

    /// Player first, then NPCs in order of appearance.
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        std::iter::once(&self.player).chain(self.npcs.iter())
    }

    /// Append a narrative entry.
    pub fn add_event(&mut self, text: impl Into<String>) {
        self.history.push(text.into());
    }

    /// Append `You do: <action>`.
    pub fn add_player_action(&mut self, action: &str) -> Result<(), StoryError> {
        let action = action.trim();
        if action.is_empty() {
            return Err(StoryError::EmptyAction);
        }
        match self.history.first() {
            Some(first) if !is_action(first) => {
                self.history.push(format!("{ACTION_PREFIX}{action}"));
                Ok(())
            }
            _ => Err(StoryError::ActionBeforeNarrative),
        }
    }

    pub fn add_key_event(&mut self, summary: impl Into<String>) {
        self.key_events.push(summary.into());
    }

    /// Register an NPC, replacing an earlier entry with the same id.
    pub fn upsert_npc(&mut self, npc: Character) {
        match self.npcs.iter_mut().find(|c| c.id == npc.id) {
            Some(existing) => *existing = npc,
            None => self.npcs.push(npc),
        }
    }

    /// The opening narrative, if the story has started.
    pub fn background(&self) -> Option<&str> {
        self.history.first().map(String::as_str)
    }

    /// The narrative the player is currently reacting to.
    ///
    /// If the log ends with a player action this is the entry just before
    /// it; otherwise it is the last entry.
    pub fn latest_event(&self) -> Option<&str> {
        match self.history.split_last() {
            Some((last, rest)) if is_action(last) => rest.last().map(String::as_str),
            Some((last, _)) => Some(last.as_str()),
            None => None,
        }
    }

    /// Text of the most recent player action, without the prefix.
    pub fn latest_player_action(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find_map(|e| e.strip_prefix(ACTION_PREFIX))
    }

    /// Replace the log and player with a loaded game.
    ///
    /// Key events and NPCs belong to the abandoned timeline and are cleared.
    pub fn restore(&mut self, history: Vec<String>, player: Character) {
        self.rule.restore_attributes(player.attributes.names());
        self.history = history;
        self.player = player;
        self.key_events.clear();
        self.npcs.clear();
    }
}

/// Whether a log entry is a player action.
pub fn is_action(entry: &str) -> bool {
    entry.starts_with(ACTION_PREFIX.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_character_defaults() {
        let rule = GameRule::default();
        let c = Character::new("Aldric", &rule);
        assert_eq!(c.hp, 100);
        assert_eq!(c.golds, 100);
        assert_eq!(c.alignment, "neutral");
        assert_eq!(c.classtype, "N/A");
        assert_eq!(c.attributes.len(), 4);
        assert_eq!(c.attribute("speed"), 0);
        assert!(!c.is_defeated());
    }

    #[test]
    fn test_learn_overwrites() {
        let mut c = Character::new("Aldric", &GameRule::default());
        let first = Skill {
            description: "old".into(),
            effect: "Add 1 points to your Speed rolls".into(),
        };
        let second = Skill {
            description: "new".into(),
            effect: "Add 3 points to your Speed rolls".into(),
        };
        assert!(c.learn("Dash", first.clone()).is_none());
        assert_eq!(c.learn("Dash", second), Some(first));
        assert_eq!(c.skills.len(), 1);
        assert_eq!(c.skills["Dash"].description, "new");
    }

    #[test]
    fn test_action_requires_narrative() {
        let mut story = Story::new(GameRule::default());
        assert_eq!(
            story.add_player_action("look around"),
            Err(StoryError::ActionBeforeNarrative)
        );
        story.add_event("A cold wind blows.");
        story.add_player_action("look around").unwrap();
        assert_eq!(story.history()[1], "You do: look around");
        assert_eq!(story.add_player_action("  "), Err(StoryError::EmptyAction));
    }

    #[test]
    fn test_latest_event_and_action() {
        let mut story = Story::new(GameRule::default());
        assert_eq!(story.latest_event(), None);

        story.add_event("Background");
        story.add_event("A wolf appears.");
        assert_eq!(story.latest_event(), Some("A wolf appears."));

        story.add_player_action("draw sword").unwrap();
        assert_eq!(story.latest_event(), Some("A wolf appears."));
        assert_eq!(story.latest_player_action(), Some("draw sword"));
        assert_eq!(story.background(), Some("Background"));
    }

    #[test]
    fn test_characters_player_first() {
        let rule = GameRule::default();
        let mut story = Story::new(rule.clone());
        let mut wolf = Character::new("Wolf", &rule);
        story.upsert_npc(wolf.clone());
        wolf.hp = 10;
        story.upsert_npc(wolf);

        let names: Vec<_> = story.characters().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Player", "Wolf"]);
        assert_eq!(story.npcs()[0].hp, 10);
    }

    #[test]
    fn test_sheet_display() {
        let mut c = Character::new("Aldric", &GameRule::default());
        c.attributes.set("Strength", 3);
        let sheet = c.to_string();
        assert!(sheet.starts_with("Name: Aldric\n"));
        assert!(sheet.contains("  Strength: 3\n"));
        assert!(sheet.contains("HP: 100\n"));
    }
}
