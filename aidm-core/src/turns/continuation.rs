use super::{Turn, TurnError, TurnOutcome};
use crate::prompts;

/// Plain narration: continue the story from the latest action.
pub async fn run(turn: &mut Turn<'_>) -> Result<TurnOutcome, TurnError> {
    let prompt = prompts::continuation(&turn.context());
    turn.narrate(prompt).await?;
    turn.player_action().await?;
    Ok(TurnOutcome::Continue)
}
