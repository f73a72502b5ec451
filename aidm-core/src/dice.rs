//! Attribute dice pools.
//!
//! A character rolls as many dice as the value of the attribute being
//! tested and sums the faces. Skills whose effect text mentions that
//! attribute add flat points on top.

use crate::condition::{ConditionError, SuccessCondition};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error type for dice rolling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Dice must have at least one side")]
    NoSides,
}

/// Source of individual die faces.
pub trait DiceSource: Send {
    /// Roll one die, returning a face in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// Uniformly random dice.
pub struct RandomDice<R = StdRng> {
    rng: R,
}

impl RandomDice<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible dice for replays and tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDice<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng + Send> RandomDice<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> DiceSource for RandomDice<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides)
    }
}

/// Result of rolling a pool of identical dice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRoll {
    pub sides: u32,
    pub rolls: Vec<u32>,
    pub total: i32,
}

impl PoolRoll {
    /// Format the faces for display, e.g. `3, 6, 1`.
    pub fn faces(&self) -> String {
        self.rolls
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for PoolRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d{} [{}] = {}",
            self.rolls.len(),
            self.sides,
            self.faces(),
            self.total
        )
    }
}

/// Roll `count` dice with `sides` faces each and sum them.
///
/// A pool of zero dice is valid and totals zero.
pub fn roll_pool(count: u32, sides: u32, dice: &mut dyn DiceSource) -> Result<PoolRoll, DiceError> {
    if sides == 0 {
        return Err(DiceError::NoSides);
    }

    let rolls: Vec<u32> = (0..count)
        .map(|_| dice.roll_die(sides).clamp(1, sides))
        .collect();
    let total = rolls.iter().fold(0i32, |sum, &r| {
        sum.saturating_add(i32::try_from(r).unwrap_or(i32::MAX))
    });

    Ok(PoolRoll {
        sides,
        rolls,
        total,
    })
}

/// Points a single skill contributes to a roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillBonus {
    pub skill: String,
    pub points: i32,
}

/// Collect the bonuses of every skill whose effect mentions `attribute`.
///
/// Matching is a case-insensitive substring test; the amount comes from an
/// "add N points" phrase in the effect. A skill that mentions the attribute
/// without such a phrase contributes nothing.
pub fn skill_bonuses<'a, I>(attribute: &str, skills: I) -> Vec<SkillBonus>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let needle = attribute.to_lowercase();
    skills
        .into_iter()
        .filter(|(_, effect)| effect.to_lowercase().contains(&needle))
        .filter_map(|(name, effect)| {
            parse_add_points(effect).map(|points| SkillBonus {
                skill: name.to_string(),
                points,
            })
        })
        .collect()
}

/// Sum of the bonuses' points, saturating at the `i32` bounds.
pub fn bonus_points(bonuses: &[SkillBonus]) -> i32 {
    bonuses
        .iter()
        .fold(0i32, |sum, b| sum.saturating_add(b.points))
}

/// Add every matching skill bonus to `total`.
pub fn apply_skill_bonus<'a, I>(total: i32, attribute: &str, skills: I) -> i32
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    total.saturating_add(bonus_points(&skill_bonuses(attribute, skills)))
}

/// Evaluate a success-condition expression with `total` and `requirement` bound.
pub fn evaluate_success(
    total: i32,
    requirement: i32,
    expression: &str,
) -> Result<bool, ConditionError> {
    SuccessCondition::parse(expression)?.evaluate(total, requirement)
}

/// Find "add N point(s)" in an effect text.
fn parse_add_points(effect: &str) -> Option<i32> {
    // ASCII lowering keeps byte offsets aligned with the original text.
    let lower = effect.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(found) = lower[search_from..].find("add") {
        let after = search_from + found + "add".len();
        search_from = after;

        let rest = lower[after..].trim_start();
        let rest = rest.strip_prefix('+').unwrap_or(rest);
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }
        if !rest[digits.len()..].trim_start().starts_with("point") {
            continue;
        }
        if let Ok(points) = digits.parse::<i32>() {
            return Some(points);
        }
    }

    None
}
