//! Player input: slash commands and free-text actions.

use crate::persist::SaveStore;
use crate::world::Story;
use std::io;

/// Where the player reads output and types input.
pub trait Terminal: Send {
    /// Show `prompt` and read one line. `Ok(None)` means input is closed.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Show a message to the player.
    fn show(&mut self, text: &str);
}

pub const HELP: &str = "\
Commands:
  /me                   Show your character sheet
  /save <name>          Save the game as <name>.txt and <name>_chara.txt
  /read <name>          Load a saved game
  /events               List the key events so far
  /rule <key> <value>   Change a game rule (dice_sides, max_attribute_point,
                        attributes, success_condition, skill_impact, or any
                        custom key)
  /help                 Show this list
Anything else is what your character does.";

pub const RULE_USAGE: &str = "Usage: /rule <key> <value>, e.g. /rule dice_sides 10";

/// A recognized slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Me,
    Save(String),
    Read(String),
    Events,
    Rule { key: String, value: String },
    Help,
}

/// One line of player input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line; ask again.
    Empty,
    /// Free text the character does.
    Action(String),
    Command(Command),
    /// A slash command that could not be understood, with the message to show.
    Invalid(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Action(line.to_string());
    };

    let (word, rest) = match command.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (command, ""),
    };

    match word {
        "me" => Input::Command(Command::Me),
        "events" => Input::Command(Command::Events),
        "help" => Input::Command(Command::Help),
        "save" | "read" if rest.is_empty() => Input::Invalid(format!("Usage: /{word} <name>")),
        "save" => Input::Command(Command::Save(rest.to_string())),
        "read" => Input::Command(Command::Read(rest.to_string())),
        "rule" => match rest.split_once(char::is_whitespace) {
            Some((key, value)) if !value.trim().is_empty() => Input::Command(Command::Rule {
                key: key.to_string(),
                value: value.trim().to_string(),
            }),
            _ => Input::Invalid(RULE_USAGE.to_string()),
        },
        _ => Input::Invalid(format!(
            "Unknown command '/{word}'. Type /help for the list of commands."
        )),
    }
}

/// Run a command against the story. Failures are reported to the player;
/// none of them ends the game.
pub async fn execute(
    command: &Command,
    story: &mut Story,
    saves: &SaveStore,
    terminal: &mut dyn Terminal,
) {
    match command {
        Command::Me => terminal.show(&story.player().to_string()),
        Command::Help => terminal.show(HELP),
        Command::Events => {
            if story.key_events().is_empty() {
                terminal.show("No key events yet.");
            } else {
                let list = story
                    .key_events()
                    .iter()
                    .enumerate()
                    .map(|(i, e)| format!("{}. {e}", i + 1))
                    .collect::<Vec<_>>()
                    .join("\n");
                terminal.show(&list);
            }
        }
        Command::Rule { key, value } => match story.rule_mut().update(key, value) {
            Ok(update) => {
                tracing::info!(key = %update.key, value = %update.value, "Rule updated");
                terminal.show(&update.to_string());
            }
            Err(e) => terminal.show(&format!("[ERROR] {e}\n{RULE_USAGE}")),
        },
        Command::Save(name) => match saves.save(name, story).await {
            Ok(paths) => terminal.show(&format!(
                "Game saved to {} and {}",
                paths.story.display(),
                paths.character.display()
            )),
            Err(e) => {
                tracing::warn!(error = %e, "Save failed");
                terminal.show(&format!("[ERROR] Could not save: {e}"));
            }
        },
        Command::Read(name) => match saves.load(name).await {
            Ok(saved) => {
                saved.apply(story);
                terminal.show(&format!("Game loaded from '{name}'."));
                if let Some(latest) = story.latest_event() {
                    terminal.show(latest);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Load failed");
                terminal.show(&format!("[ERROR] Could not load: {e}"));
            }
        },
    }
}
