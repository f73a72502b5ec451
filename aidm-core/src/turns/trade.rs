//! Trades: the player gives something up and gets something back.

use super::{Turn, TurnError, TurnOutcome};
use crate::extract::{section_changes, Direction};
use crate::prompts;

pub async fn run(turn: &mut Turn<'_>) -> Result<TurnOutcome, TurnError> {
    let prompt = prompts::trade_scene(&turn.context());
    turn.narrate(prompt).await?;

    loop {
        let action = turn.player_action().await?;

        let prompt = prompts::trade_outcome(&turn.context(), &action);
        let resolution = turn.generate(prompt, true).await?;
        turn.record(&resolution).await?;

        let changes = section_changes(&resolution, "You lose", Direction::Loss).and_then(|mut lost| {
            lost.extend(section_changes(&resolution, "You gain", Direction::Gain)?);
            Ok(lost)
        });
        match changes {
            Ok(changes) => {
                if changes.is_empty() {
                    turn.show("Nothing changed hands.");
                }
                turn.apply_changes(changes);
                break;
            }
            Err(e) => turn.could_not_parse("the trade", &e),
        }
    }

    if turn.story.player().is_defeated() {
        tracing::info!(hp = turn.story.player().hp, "Player defeated outside battle");
        return Ok(TurnOutcome::PlayerDefeated);
    }

    turn.finish("The trade is done. What would you like to do next?")
        .await?;
    Ok(TurnOutcome::Continue)
}
