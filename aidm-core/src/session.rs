//! Game session management.
//!
//! Owns the story and the three seams (generator, terminal, dice) and
//! drives the loop: classify the latest action, play that turn, repeat
//! until the player falls or input ends.

use crate::classify::classify;
use crate::dice::DiceSource;
use crate::gateway::Generator;
use crate::persist::{PersistenceError, SaveStore};
use crate::rules::GameRule;
use crate::shell::{self, Command, Input, Terminal};
use crate::turns::{self, opening, Turn, TurnError, TurnOutcome};
use crate::world::Story;
use std::path::PathBuf;
use thiserror::Error;

pub const WELCOME: &str = "\
Welcome, adventurer. A new story is about to be written.
Type /help at any time to see the available commands.";

pub const GAME_OVER: &str = "Your HP is 0. Game over.";

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Giving up after {failures} failed turns in a row; last error: {last}")]
    TooManyFailures { failures: u32, last: String },
}

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory for `/save` and `/read`.
    pub save_dir: PathBuf,

    /// Consecutive aborted turns tolerated before the session gives up.
    pub max_failed_turns: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("."),
            max_failed_turns: 3,
        }
    }
}

impl SessionConfig {
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn with_max_failed_turns(mut self, max: u32) -> Self {
        self.max_failed_turns = max.max(1);
        self
    }
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    PlayerDefeated,
    InputClosed,
}

/// A running game.
pub struct Session {
    gateway: Box<dyn Generator>,
    terminal: Box<dyn Terminal>,
    dice: Box<dyn DiceSource>,
    story: Story,
    saves: SaveStore,
    config: SessionConfig,
}

impl Session {
    pub fn new(
        gateway: Box<dyn Generator>,
        terminal: Box<dyn Terminal>,
        dice: Box<dyn DiceSource>,
        rule: GameRule,
        config: SessionConfig,
    ) -> Self {
        Self {
            gateway,
            terminal,
            dice,
            story: Story::new(rule),
            saves: SaveStore::new(config.save_dir.clone()),
            config,
        }
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    pub fn story_mut(&mut self) -> &mut Story {
        &mut self.story
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn turn(&mut self) -> Turn<'_> {
        Turn {
            gateway: &*self.gateway,
            terminal: &mut *self.terminal,
            dice: &mut *self.dice,
            story: &mut self.story,
            saves: &self.saves,
        }
    }

    /// Open the game (fresh, or from the save `load`) and play until it ends.
    pub async fn run(&mut self, load: Option<&str>) -> Result<SessionEnd, SessionError> {
        let started = match load {
            Some(name) => {
                self.load(name).await?;
                opening::resume(&mut self.turn()).await
            }
            None => self.start().await,
        };

        match started {
            Ok(()) => self.play().await,
            Err(TurnError::InputClosed) => Ok(SessionEnd::InputClosed),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the story with a saved game.
    pub async fn load(&mut self, name: &str) -> Result<(), PersistenceError> {
        let saved = self.saves.load(name).await?;
        saved.apply(&mut self.story);
        self.terminal.show(&format!("Game loaded from '{name}'."));
        Ok(())
    }

    /// Ask for the player's name (or a save to read) and open the story.
    pub async fn start(&mut self) -> Result<(), TurnError> {
        self.terminal.show(WELCOME);

        loop {
            let Some(line) = self
                .terminal
                .read_line("What is your name? (or /read <name> to continue a saved game): ")?
            else {
                return Err(TurnError::InputClosed);
            };

            match shell::parse_input(&line) {
                Input::Empty => continue,
                Input::Invalid(message) => self.terminal.show(&message),
                Input::Command(Command::Read(name)) => match self.load(&name).await {
                    Ok(()) => return opening::resume(&mut self.turn()).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "Load failed");
                        self.terminal.show(&format!("[ERROR] Could not load: {e}"));
                    }
                },
                Input::Command(command) => {
                    shell::execute(&command, &mut self.story, &self.saves, &mut *self.terminal)
                        .await
                }
                Input::Action(name) => {
                    return opening::new_game(&mut self.turn(), &name).await;
                }
            }
        }
    }

    /// Play turns until the player is defeated or input closes.
    ///
    /// A turn that fails recoverably is abandoned and the next one starts
    /// from the same story state; too many in a row end the session.
    pub async fn play(&mut self) -> Result<SessionEnd, SessionError> {
        let mut failures = 0;

        loop {
            if self.story.player().is_defeated() {
                self.terminal.show(GAME_OVER);
                tracing::info!(turns = self.story.history().len(), "Player defeated");
                return Ok(SessionEnd::PlayerDefeated);
            }

            match self.next_turn().await {
                Ok(TurnOutcome::Continue) | Ok(TurnOutcome::PlayerDefeated) => failures = 0,
                Err(TurnError::InputClosed) => return Ok(SessionEnd::InputClosed),
                Err(e) if e.is_recoverable() => {
                    failures += 1;
                    tracing::warn!(
                        error = %e,
                        failures,
                        max_failed_turns = self.config.max_failed_turns,
                        "Turn aborted"
                    );
                    if failures >= self.config.max_failed_turns {
                        return Err(SessionError::TooManyFailures {
                            failures,
                            last: e.to_string(),
                        });
                    }
                    self.terminal
                        .show(&format!("[ERROR] {e}. The story pauses; trying again."));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Classify the latest action and play one turn of that kind.
    pub async fn next_turn(&mut self) -> Result<TurnOutcome, TurnError> {
        let kind = classify(&*self.gateway, &self.story).await?;
        turns::play(&mut self.turn(), kind).await
    }
}
