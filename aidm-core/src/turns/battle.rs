//! Battles: opposed rolls until one side drops or the player gets away.

use super::{Turn, TurnError, TurnOutcome};
use crate::extract::{
    attribute_values, healing, labeled_count, labeled_int, labeled_value, roll_option,
    ExtractionError,
};
use crate::prompts::{self, BattleCause, ESCAPE_MARKER};
use crate::rules::GameRule;
use crate::world::Character;

/// How a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleOutcome {
    EnemyDefeated,
    Escaped,
    PlayerDefeated,
    /// The enemy's stats could not be read, so no fight took place.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleReport {
    pub enemy: Option<String>,
    /// Exchanges where both sides actually rolled.
    pub exchanges: u32,
    pub outcome: BattleOutcome,
}

impl BattleReport {
    pub fn turn_outcome(&self) -> TurnOutcome {
        match self.outcome {
            BattleOutcome::PlayerDefeated => TurnOutcome::PlayerDefeated,
            _ => TurnOutcome::Continue,
        }
    }
}

/// Read the enemy's stat block. Name, HP and every rule attribute are required.
pub fn parse_enemy(text: &str, rule: &GameRule) -> Result<Character, ExtractionError> {
    let name = labeled_value(text, "Enemy name").or_else(|_| labeled_value(text, "Name"))?;
    let hp = labeled_int(text, "HP")?;
    let attributes = attribute_values(text, rule.attributes())?;

    let mut enemy = Character::new(name, rule);
    for (attr, value) in attributes {
        enemy.attributes.set(&attr, value.min(rule.max_attribute_point()));
    }
    enemy.hp = hp;
    enemy.golds = 0;
    if let Ok(classtype) = labeled_value(text, "Classtype") {
        enemy.classtype = classtype.to_string();
    }
    if let Ok(race) = labeled_value(text, "Race") {
        enemy.race = race.to_string();
    }
    if let Ok(description) = labeled_value(text, "Description") {
        enemy.description = description.to_string();
    }
    Ok(enemy)
}

/// HP left after taking `damage`, saturating instead of wrapping.
fn wound(hp: i32, damage: u32) -> i32 {
    hp.saturating_sub(i32::try_from(damage).unwrap_or(i32::MAX))
}

pub async fn run(turn: &mut Turn<'_>, cause: BattleCause) -> Result<BattleReport, TurnError> {
    let prompt = prompts::battle_scene(&turn.context(), cause);
    let scene = turn.narrate(prompt).await?;

    let mut enemy = match parse_enemy(&scene, turn.story.rule()) {
        Ok(enemy) => enemy,
        Err(e) => {
            turn.could_not_parse("the enemy", &e);
            turn.player_action().await?;
            return Ok(BattleReport {
                enemy: None,
                exchanges: 0,
                outcome: BattleOutcome::Aborted,
            });
        }
    };
    tracing::info!(enemy = %enemy.name, hp = enemy.hp, ?cause, "Battle started");
    turn.story.upsert_npc(enemy.clone());

    let mut exchanges = 0;
    let outcome = loop {
        let action = turn.player_action().await?;

        let prompt = prompts::battle_option(&turn.context(), &enemy, &action);
        let option_text = turn.generate(prompt, true).await?;
        turn.record(&option_text).await?;

        let option = match roll_option(&option_text, turn.story.rule().attributes()) {
            Ok(option) => option,
            Err(e) => {
                turn.could_not_parse("the battle option", &e);
                continue;
            }
        };

        let enemy_roll = match turn.opposing_roll(&enemy, &option.attribute) {
            Ok(roll) => roll,
            Err(e) => {
                turn.could_not_parse("the enemy roll", &e);
                continue;
            }
        };
        let check = match turn.roll_check(&option.attribute, enemy_roll.total) {
            Ok(check) => check,
            Err(e) => {
                turn.could_not_parse("the roll", &e);
                continue;
            }
        };
        exchanges += 1;

        if check.success {
            let result = turn
                .generate(prompts::battle_hit(&option.name, &enemy), true)
                .await?;
            turn.record(&result).await?;

            if result.contains(ESCAPE_MARKER) {
                turn.show("You escaped the battle.");
                break BattleOutcome::Escaped;
            }

            if let Some(amount) = healing(&result) {
                let player = turn.story.player_mut();
                player.hp = player.hp.saturating_add(amount);
                let hp = player.hp;
                turn.show(&format!("HP +{amount}. Your HP: {hp}"));
            }

            match labeled_count(&result, "Damage") {
                Ok(damage) => enemy.hp = wound(enemy.hp, damage),
                Err(ExtractionError::MissingLabel { .. }) => {}
                Err(e) => {
                    turn.could_not_parse("the damage", &e);
                    continue;
                }
            }
            turn.story.upsert_npc(enemy.clone());

            if enemy.is_defeated() {
                break BattleOutcome::EnemyDefeated;
            }
            turn.show(&format!("{} HP: {}. The battle continues.", enemy.name, enemy.hp));
        } else {
            let result = turn
                .generate(prompts::battle_miss(&option.name, &enemy), true)
                .await?;
            turn.record(&result).await?;

            match labeled_count(&result, "Damage") {
                Ok(damage) => {
                    let player = turn.story.player_mut();
                    player.hp = wound(player.hp, damage);
                }
                Err(ExtractionError::MissingLabel { .. }) => {}
                Err(e) => {
                    turn.could_not_parse("the damage", &e);
                    continue;
                }
            }

            if turn.story.player().is_defeated() {
                break BattleOutcome::PlayerDefeated;
            }
            let hp = turn.story.player().hp;
            turn.show(&format!("Your HP: {hp}. The battle continues."));
        }
    };

    tracing::info!(enemy = %enemy.name, exchanges, ?outcome, "Battle over");

    match outcome {
        BattleOutcome::EnemyDefeated => {
            let prompt = prompts::battle_victory(&turn.context(), &enemy);
            let reward = turn.generate(prompt, true).await?;
            turn.record(&reward).await?;
            if let Err(e) = turn.grant_reward(&reward) {
                turn.could_not_parse("the reward", &e);
            }
            turn.finish("You have won the battle. What would you like to do next?")
                .await?;
        }
        BattleOutcome::Escaped => {
            turn.finish("What would you like to do next?").await?;
        }
        BattleOutcome::PlayerDefeated | BattleOutcome::Aborted => {}
    }

    Ok(BattleReport {
        enemy: Some(enemy.name),
        exchanges,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enemy() {
        let text = "Three wolves circle you.\nEnemy name: Frost Wolves\nClasstype: Beast\nRace: Wolf\n\
                    Strength: 3\nIntelligence: 1\nSpeed: 5\nCharisma: 0\nHP: 60\nDescription: Hungry.";
        let enemy = parse_enemy(text, &GameRule::default()).unwrap();
        assert_eq!(enemy.name, "Frost Wolves");
        assert_eq!(enemy.hp, 60);
        assert_eq!(enemy.attribute("Speed"), 5);
        assert_eq!(enemy.race, "Wolf");
    }

    #[test]
    fn test_parse_enemy_clamps_attributes() {
        let text = "Enemy name: Titan\nStrength: 2000000000\nIntelligence: 1\nSpeed: 1\nCharisma: 1\nHP: 10";
        let enemy = parse_enemy(text, &GameRule::default()).unwrap();
        assert_eq!(enemy.attribute("Strength"), 6);
    }

    #[test]
    fn test_wound_saturates() {
        assert_eq!(wound(10, 4), 6);
        assert_eq!(wound(-10, u32::MAX), i32::MIN);
    }

    #[test]
    fn test_parse_enemy_requires_attributes() {
        let text = "Enemy name: Slime\nHP: 10\nStrength: 1";
        assert!(matches!(
            parse_enemy(text, &GameRule::default()),
            Err(ExtractionError::MissingLabel { .. })
        ));
    }
}
