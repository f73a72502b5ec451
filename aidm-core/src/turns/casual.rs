//! Casual events: small happenings with an optional reward and penalty.

use super::{Turn, TurnError, TurnOutcome};
use crate::extract::{section_changes, Direction};
use crate::prompts;

pub async fn run(turn: &mut Turn<'_>) -> Result<TurnOutcome, TurnError> {
    let prompt = prompts::casual_scene(&turn.context());
    turn.narrate(prompt).await?;

    loop {
        let action = turn.player_action().await?;

        let prompt = prompts::casual_outcome(&turn.context(), &action);
        let outcome = turn.generate(prompt, true).await?;
        turn.record(&outcome).await?;

        // Both sections are parsed before either is applied.
        let changes = section_changes(&outcome, "Reward", Direction::Gain).and_then(|mut gains| {
            gains.extend(section_changes(&outcome, "Penalty", Direction::Loss)?);
            Ok(gains)
        });
        match changes {
            Ok(changes) => {
                tracing::debug!(changes = changes.len(), "Casual event resolved");
                turn.apply_changes(changes);
                break;
            }
            Err(e) => turn.could_not_parse("the event outcome", &e),
        }
    }

    if turn.story.player().is_defeated() {
        tracing::info!(hp = turn.story.player().hp, "Player defeated outside battle");
        return Ok(TurnOutcome::PlayerDefeated);
    }

    turn.finish("The event has passed. What would you like to do next?")
        .await?;
    Ok(TurnOutcome::Continue)
}
