//! Turn orchestrators.
//!
//! Every turn follows the same shape: ask the generator for a scene, log it
//! and its one-line summary, read the player's action, resolve it with
//! dice where the turn calls for it, apply whatever the outcome text says
//! changed, and finish by reading the next action.

pub mod battle;
mod casual;
mod continuation;
mod encounter;
pub mod opening;
mod trade;

pub use battle::{BattleOutcome, BattleReport};

use crate::classify::{ClassificationError, EventKind};
use crate::condition::ConditionError;
use crate::dice::{bonus_points, roll_pool, skill_bonuses, DiceError, DiceSource, PoolRoll, SkillBonus};
use crate::extract::{section_changes, Change, Direction, ExtractionError, Resource};
use crate::gateway::{GenerationError, Generator};
use crate::persist::SaveStore;
use crate::prompts::{self, StoryContext};
use crate::shell::{self, Input, Terminal};
use crate::world::{Character, Skill, Story, StoryError};
use aidm_llm::Message;
use std::fmt;
use thiserror::Error;

/// Errors that abort a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Story(#[from] StoryError),

    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),

    #[error("Input closed")]
    InputClosed,
}

impl TurnError {
    /// Whether the session can carry on with a fresh turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TurnError::Generation(_) | TurnError::Classification(_) | TurnError::Story(_)
        )
    }
}

/// Generated text that could not be turned into a game effect.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Dice(#[from] DiceError),
}

/// How a turn left the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    PlayerDefeated,
}

/// A player roll against a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub attribute: String,
    pub roll: PoolRoll,
    pub bonuses: Vec<SkillBonus>,
    pub total: i32,
    pub requirement: i32,
    pub success: bool,
}

/// Everything a turn touches, borrowed from the session.
pub struct Turn<'a> {
    pub gateway: &'a dyn Generator,
    pub terminal: &'a mut dyn Terminal,
    pub dice: &'a mut dyn DiceSource,
    pub story: &'a mut Story,
    pub saves: &'a SaveStore,
}

impl Turn<'_> {
    pub fn show(&mut self, text: &str) {
        self.terminal.show(text);
    }

    pub fn context(&self) -> StoryContext {
        StoryContext::from_story(self.story)
    }

    pub async fn generate(&mut self, prompt: String, display: bool) -> Result<String, TurnError> {
        Ok(self
            .gateway
            .generate(&[Message::user(prompt)], display)
            .await?)
    }

    /// Generate text shown to the player, then log and summarize it.
    pub async fn narrate(&mut self, prompt: String) -> Result<String, TurnError> {
        let text = self.generate(prompt, true).await?;
        self.record(&text).await?;
        Ok(text)
    }

    /// Log a narrative entry and its key-event summary.
    pub async fn record(&mut self, text: &str) -> Result<(), TurnError> {
        self.story.add_event(text);
        let summary = self.generate(prompts::summary(text), false).await?;
        self.story.add_key_event(summary.trim());
        Ok(())
    }

    /// Read input until the player types an action, running any commands on the way.
    pub async fn player_action(&mut self) -> Result<String, TurnError> {
        loop {
            let Some(line) = self.terminal.read_line("\nYou do: ")? else {
                return Err(TurnError::InputClosed);
            };
            match shell::parse_input(&line) {
                Input::Empty => continue,
                Input::Invalid(message) => self.show(&message),
                Input::Command(command) => {
                    shell::execute(&command, self.story, self.saves, self.terminal).await
                }
                Input::Action(action) => {
                    self.story.add_player_action(&action)?;
                    return Ok(action);
                }
            }
        }
    }

    /// Close a turn: tell the player it is over and take their next action.
    pub async fn finish(&mut self, message: &str) -> Result<(), TurnError> {
        self.show(message);
        self.player_action().await?;
        Ok(())
    }

    pub fn could_not_parse(&mut self, what: &str, err: &dyn fmt::Display) {
        tracing::warn!(what, error = %err, "Could not parse generated outcome");
        self.show(&format!(
            "[ERROR] Could not parse the outcome ({what}: {err}). Please describe your action again."
        ));
    }

    /// Roll the player's pool for `attribute`, add skill bonuses and test
    /// the rule's success condition against `requirement`.
    pub fn roll_check(&mut self, attribute: &str, requirement: i32) -> Result<Check, ResolveError> {
        let rule = self.story.rule();
        let player = self.story.player();

        let roll = roll_pool(player.attribute(attribute), rule.dice_sides(), &mut *self.dice)?;
        let bonuses = skill_bonuses(attribute, player.skill_effects());
        let total = roll.total.saturating_add(bonus_points(&bonuses));
        let success = rule.success_condition().evaluate(total, requirement)?;

        let mut lines = vec![format!(
            "The dice you rolled for {attribute}: {}",
            if roll.rolls.is_empty() { "none".to_string() } else { roll.faces() }
        )];
        for bonus in &bonuses {
            lines.push(format!("Your skill {} adds {} points.", bonus.skill, bonus.points));
        }
        lines.push(format!("In total: {total} (needed: {requirement})"));
        lines.push(if success { "Success!" } else { "Fail!" }.to_string());

        tracing::debug!(attribute, total, requirement, success, "Player check");
        self.show(&lines.join("\n"));

        Ok(Check {
            attribute: attribute.to_string(),
            roll,
            bonuses,
            total,
            requirement,
            success,
        })
    }

    /// Roll an opponent's pool for `attribute`.
    pub fn opposing_roll(&mut self, opponent: &Character, attribute: &str) -> Result<PoolRoll, ResolveError> {
        let roll = roll_pool(
            opponent.attribute(attribute),
            self.story.rule().dice_sides(),
            &mut *self.dice,
        )?;
        self.show(&format!(
            "{} rolls for {attribute}: {} (total {})",
            opponent.name,
            if roll.rolls.is_empty() { "none".to_string() } else { roll.faces() },
            roll.total
        ));
        Ok(roll)
    }

    /// Parse the single reward granted in `text` and apply it.
    pub fn grant_reward(&mut self, text: &str) -> Result<(), ExtractionError> {
        let changes = section_changes(text, "Reward", Direction::Gain)?;
        if changes.len() > 1 {
            tracing::debug!(extra = changes.len() - 1, "Ignoring extra rewards");
        }
        match changes.into_iter().next() {
            Some(change) => self.apply_changes(vec![change]),
            None => self.show("No reward this time."),
        }
        Ok(())
    }

    pub fn apply_changes(&mut self, changes: Vec<Change>) {
        for change in changes {
            match change {
                Change::Resource { resource, amount } => {
                    let player = self.story.player_mut();
                    let now = match resource {
                        Resource::Golds => {
                            player.golds = player.golds.saturating_add(amount);
                            player.golds
                        }
                        Resource::Hp => {
                            player.hp = player.hp.saturating_add(amount);
                            player.hp
                        }
                    };
                    tracing::info!(resource = resource.label(), amount, now, "Player resources changed");
                    self.show(&format!("{} {amount:+} (now {now})", resource.label()));
                }
                Change::Skill(block) => {
                    tracing::info!(skill = %block.name, "Player learned a skill");
                    let name = block.name;
                    self.story.player_mut().learn(
                        name.clone(),
                        Skill {
                            description: block.description,
                            effect: block.effect,
                        },
                    );
                    let sheet = self.story.player().to_string();
                    self.show(&format!("You learned a new skill: {name}\nYour skills are updated:\n{sheet}"));
                }
            }
        }
    }
}

/// Play one turn of the given kind.
pub async fn play(turn: &mut Turn<'_>, kind: EventKind) -> Result<TurnOutcome, TurnError> {
    tracing::info!(%kind, "Starting turn");
    match kind {
        EventKind::Battle => Ok(battle::run(turn, prompts::BattleCause::Initiated)
            .await?
            .turn_outcome()),
        EventKind::Encounter => encounter::run(turn).await,
        EventKind::CasualEvent => casual::run(turn).await,
        EventKind::Trade => trade::run(turn).await,
        EventKind::Continuation => continuation::run(turn).await,
    }
}
