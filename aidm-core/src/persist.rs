//! Save and load games as plain text.
//!
//! A save named `N` is two files in the save directory: `N.txt` holds the
//! story log one line per entry, `N_chara.txt` holds the player character
//! sheet. Loading parses both before touching the running game, so a bad
//! save leaves the current story intact.

use crate::extract::{labeled_int, labeled_value, ExtractionError};
use crate::rules::validate_attribute_names;
use crate::world::{is_action, Attributes, Character, Skill, Story};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No saved game named '{name}' (looked for {path})")]
    Missing { name: String, path: PathBuf },

    #[error("Malformed save file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Save name must not be empty")]
    EmptyName,
}

/// Paths of the two files making up one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePaths {
    pub story: PathBuf,
    pub character: PathBuf,
}

/// A save read back from disk, not yet applied to a story.
#[derive(Debug, Clone)]
pub struct SavedGame {
    pub history: Vec<String>,
    pub player: Character,
}

impl SavedGame {
    /// Replace the story's log and player with this save.
    pub fn apply(self, story: &mut Story) {
        story.restore(self.history, self.player);
    }
}

/// Directory holding save files.
#[derive(Debug, Clone)]
pub struct SaveStore {
    dir: PathBuf,
}

impl SaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self, name: &str) -> Result<SavePaths, PersistenceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PersistenceError::EmptyName);
        }
        Ok(SavePaths {
            story: self.dir.join(format!("{name}.txt")),
            character: self.dir.join(format!("{name}_chara.txt")),
        })
    }

    /// Write the story log and player sheet.
    pub async fn save(&self, name: &str, story: &Story) -> Result<SavePaths, PersistenceError> {
        let paths = self.paths(name)?;

        fs::create_dir_all(&self.dir).await.map_err(|source| PersistenceError::Io {
            path: self.dir.clone(),
            source,
        })?;
        write(&paths.story, &render_story(story.history())).await?;
        write(&paths.character, &render_character(story.player())).await?;

        tracing::info!(name, dir = %self.dir.display(), "Game saved");
        Ok(paths)
    }

    /// Read and validate a save without applying it.
    pub async fn load(&self, name: &str) -> Result<SavedGame, PersistenceError> {
        let paths = self.paths(name)?;

        let story_text = read(name, &paths.story).await?;
        let character_text = read(name, &paths.character).await?;

        let history = parse_story(&story_text).map_err(|reason| PersistenceError::Malformed {
            path: paths.story.clone(),
            reason,
        })?;
        let player =
            parse_character(&character_text).map_err(|reason| PersistenceError::Malformed {
                path: paths.character.clone(),
                reason,
            })?;

        tracing::info!(name, entries = history.len(), "Game loaded");
        Ok(SavedGame { history, player })
    }
}

async fn write(path: &Path, content: &str) -> Result<(), PersistenceError> {
    fs::write(path, content)
        .await
        .map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn read(name: &str, path: &Path) -> Result<String, PersistenceError> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PersistenceError::Missing {
            name: name.to_string(),
            path: path.to_path_buf(),
        }),
        Err(source) => Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn render_story(history: &[String]) -> String {
    history.iter().map(|entry| format!("{entry}\n")).collect()
}

/// Split a story file into log entries, one per non-blank line.
pub fn parse_story(text: &str) -> Result<Vec<String>, String> {
    let history: Vec<String> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect();

    match history.first() {
        None => Err("story is empty".to_string()),
        Some(first) if is_action(first) => {
            Err("story starts with a player action instead of narrative".to_string())
        }
        Some(_) => Ok(history),
    }
}

/// Character sheet in save-file layout.
///
/// ```text
/// Name: Aldric
/// Classtype: Ranger
/// Race: Human
/// Attributes:
/// Strength: 3
/// ...
/// Alignment: neutral
/// HP: 87
/// Golds: 120
/// Skills:
/// Pursue:
///  Close the distance to a fleeing foe.
///  Effect: Add 2 points to your Speed rolls.
/// ```
pub fn render_character(c: &Character) -> String {
    let mut out = String::new();
    out.push_str(&format!("Name: {}\n", c.name));
    out.push_str(&format!("Classtype: {}\n", c.classtype));
    out.push_str(&format!("Race: {}\n", c.race));
    out.push_str("Attributes: \n");
    for (name, value) in c.attributes.iter() {
        out.push_str(&format!("{name}: {value}\n"));
    }
    out.push_str(&format!("Alignment: {}\n", c.alignment));
    out.push_str(&format!("HP: {}\n", c.hp));
    out.push_str(&format!("Golds: {}\n", c.golds));
    out.push_str("Skills: \n");
    for (name, skill) in &c.skills {
        out.push_str(&format!("{name}:\n"));
        // Every description line stays indented so it reads back under its skill.
        for line in skill.description.lines().map(str::trim).filter(|l| !l.is_empty()) {
            out.push_str(&format!(" {line}\n"));
        }
        out.push_str(&format!(" Effect: {}\n", skill.effect.trim()));
    }
    out.push('\n');
    out
}

#[derive(PartialEq)]
enum Block {
    Header,
    Attributes,
    Skills,
}

/// Parse a sheet written by [`render_character`].
pub fn parse_character(text: &str) -> Result<Character, String> {
    let field = |label: &str| -> Result<String, String> {
        labeled_value(text, label)
            .map(str::to_string)
            .map_err(|e| e.to_string())
    };
    let number = |label: &str| -> Result<i32, String> {
        labeled_int(text, label).map_err(|e: ExtractionError| e.to_string())
    };

    let mut attributes = Vec::new();
    let mut skills = BTreeMap::new();
    let mut current_skill: Option<(String, Vec<String>, Option<String>)> = None;
    let mut block = Block::Header;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indented = line.starts_with(' ') || line.starts_with('\t');
        let trimmed = line.trim();

        if !indented {
            if trimmed.starts_with("Attributes:") {
                block = Block::Attributes;
                continue;
            }
            if trimmed.starts_with("Skills:") {
                block = Block::Skills;
                continue;
            }
            if block == Block::Attributes
                && ["Alignment:", "HP:", "Golds:"].iter().any(|l| trimmed.starts_with(l))
            {
                block = Block::Header;
                continue;
            }
        }

        match block {
            Block::Header => {}
            Block::Attributes => {
                let (name, value) = trimmed
                    .split_once(':')
                    .ok_or_else(|| format!("bad attribute line '{trimmed}'"))?;
                let value = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("attribute '{}' has non-numeric value '{}'", name.trim(), value.trim()))?;
                attributes.push((name.trim().to_string(), value));
            }
            Block::Skills if !indented => {
                if let Some(done) = current_skill.take() {
                    finish_skill(done, &mut skills)?;
                }
                let name = trimmed.strip_suffix(':').unwrap_or(trimmed).trim();
                current_skill = Some((name.to_string(), Vec::new(), None));
            }
            Block::Skills => {
                let Some((_, description, effect)) = current_skill.as_mut() else {
                    return Err(format!("skill text '{trimmed}' has no skill name above it"));
                };
                match trimmed.strip_prefix("Effect:") {
                    Some(e) => *effect = Some(e.trim().to_string()),
                    None => description.push(trimmed.to_string()),
                }
            }
        }
    }
    if let Some(done) = current_skill.take() {
        finish_skill(done, &mut skills)?;
    }

    let names: Vec<String> = attributes.iter().map(|(n, _)| n.clone()).collect();
    validate_attribute_names(&names).map_err(|e| e.to_string())?;

    Ok(Character {
        name: field("Name")?,
        classtype: field("Classtype")?,
        race: field("Race")?,
        attributes: Attributes::from_pairs(attributes),
        alignment: field("Alignment")?,
        skills,
        hp: number("HP")?,
        golds: number("Golds")?,
        ..Character::new("", &Default::default())
    })
}

fn finish_skill(
    (name, description, effect): (String, Vec<String>, Option<String>),
    skills: &mut BTreeMap<String, Skill>,
) -> Result<(), String> {
    let effect = effect.ok_or_else(|| format!("skill '{name}' has no Effect line"))?;
    skills.insert(
        name,
        Skill {
            description: description.join(" "),
            effect,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::GameRule;

    fn sample() -> Character {
        let rule = GameRule::default();
        let mut c = Character::new("Aldric", &rule);
        c.classtype = "Ranger".into();
        c.race = "Human".into();
        for (name, v) in [("Strength", 3), ("Intelligence", 2), ("Speed", 4), ("Charisma", 1)] {
            c.attributes.set(name, v);
        }
        c.hp = 87;
        c.golds = 120;
        c.learn(
            "Pursue",
            Skill {
                description: "Close the distance to a fleeing foe.".into(),
                effect: "Add 2 points to your Speed rolls.".into(),
            },
        );
        c
    }

    #[test]
    fn test_render_layout() {
        let text = render_character(&sample());
        assert_eq!(
            text,
            "Name: Aldric\nClasstype: Ranger\nRace: Human\nAttributes: \nStrength: 3\n\
             Intelligence: 2\nSpeed: 4\nCharisma: 1\nAlignment: neutral\nHP: 87\nGolds: 120\n\
             Skills: \nPursue:\n Close the distance to a fleeing foe.\n \
             Effect: Add 2 points to your Speed rolls.\n\n"
        );
    }

    #[test]
    fn test_character_round_trip() {
        let original = sample();
        let parsed = parse_character(&render_character(&original)).unwrap();
        assert_eq!(parsed.name, original.name);
        assert_eq!(parsed.classtype, original.classtype);
        assert_eq!(parsed.race, original.race);
        assert_eq!(parsed.attributes, original.attributes);
        assert_eq!(parsed.alignment, original.alignment);
        assert_eq!(parsed.hp, 87);
        assert_eq!(parsed.golds, 120);
        assert_eq!(parsed.skills, original.skills);
    }

    #[test]
    fn test_multiline_description_survives_round_trip() {
        let mut original = sample();
        original.learn(
            "Frost Ward",
            Skill {
                description: "A shell of ice\nthat cracks before you do.\n".into(),
                effect: "Add 3 points to your Intelligence rolls.".into(),
            },
        );
        let text = render_character(&original);
        assert!(text.contains("Frost Ward:\n A shell of ice\n that cracks before you do.\n Effect:"));

        let parsed = parse_character(&text).unwrap();
        assert_eq!(parsed.skills.len(), 2);
        assert_eq!(
            parsed.skills["Frost Ward"].description,
            "A shell of ice that cracks before you do."
        );
        assert_eq!(parsed.skills["Pursue"], original.skills["Pursue"]);
    }

    #[test]
    fn test_render_story_ends_every_line() {
        let history = vec!["The road ends.".to_string(), "You do: run".to_string()];
        assert_eq!(render_story(&history), "The road ends.\nYou do: run\n");
        assert_eq!(render_story(&[]), "");
        assert_eq!(parse_story(&render_story(&history)).unwrap(), history);
    }

    #[test]
    fn test_parse_story_rejects_leading_action() {
        assert!(parse_story("You do: run\nThe road ends.").is_err());
        assert!(parse_story("\n\n").is_err());
        assert_eq!(
            parse_story("The road ends.\n\nYou do: run\n").unwrap(),
            vec!["The road ends.", "You do: run"]
        );
    }

    #[test]
    fn test_parse_character_rejects_bad_numbers() {
        let text = render_character(&sample()).replace("HP: 87", "HP: many");
        assert!(parse_character(&text).unwrap_err().contains("HP"));

        let text = render_character(&sample()).replace("Speed: 4", "Speed: fast");
        assert!(parse_character(&text).unwrap_err().contains("Speed"));
    }

    #[test]
    fn test_parse_character_rejects_skill_without_effect() {
        let text = "Name: A\nClasstype: B\nRace: C\nAttributes: \nStrength: 1\nAlignment: good\n\
                    HP: 10\nGolds: 5\nSkills: \nDash:\n Run fast.\n";
        assert!(parse_character(text).unwrap_err().contains("Effect"));
    }
}
