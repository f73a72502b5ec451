//! Encounters: one roll against a stated requirement. Failure turns into a battle.

use super::{battle, Turn, TurnError, TurnOutcome};
use crate::extract::{roll_option, ExtractionError};
use crate::prompts::{self, BattleCause};

pub async fn run(turn: &mut Turn<'_>) -> Result<TurnOutcome, TurnError> {
    let prompt = prompts::encounter_scene(&turn.context());
    turn.narrate(prompt).await?;

    let (option, check) = loop {
        let action = turn.player_action().await?;

        let prompt = prompts::encounter_option(&turn.context(), &action);
        let option_text = turn.generate(prompt, true).await?;
        turn.record(&option_text).await?;

        let option = match roll_option(&option_text, turn.story.rule().attributes()) {
            Ok(option) => option,
            Err(e) => {
                turn.could_not_parse("the option", &e);
                continue;
            }
        };
        let Some(requirement) = option.requirement else {
            turn.could_not_parse("the option", &ExtractionError::MissingRequirement);
            continue;
        };
        match turn.roll_check(&option.attribute, requirement) {
            Ok(check) => break (option, check),
            Err(e) => turn.could_not_parse("the roll", &e),
        }
    };

    tracing::info!(
        option = %option.name,
        attribute = %check.attribute,
        total = check.total,
        requirement = check.requirement,
        success = check.success,
        "Encounter resolved"
    );

    if !check.success {
        let report = battle::run(turn, BattleCause::FailedEncounter).await?;
        return Ok(report.turn_outcome());
    }

    let prompt = prompts::encounter_success(&turn.context(), &option.name);
    let reward = turn.generate(prompt, true).await?;
    turn.record(&reward).await?;
    if let Err(e) = turn.grant_reward(&reward) {
        turn.could_not_parse("the reward", &e);
    }

    turn.finish("You have overcome the encounter. What would you like to do next?")
        .await?;
    Ok(TurnOutcome::Continue)
}
