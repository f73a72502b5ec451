//! Deciding what kind of turn comes next.

use crate::gateway::Generator;
use crate::prompts::{self, StoryContext};
use crate::turns::TurnError;
use crate::world::Story;
use aidm_llm::Message;
use std::fmt;
use thiserror::Error;

/// The kind of turn the story moves into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CasualEvent,
    Trade,
    Encounter,
    Battle,
    /// The classifier answered "None": plain narration.
    Continuation,
}

impl EventKind {
    /// Keywords in the order they are checked. The first one found wins.
    pub const PRIORITY: [EventKind; 5] = [
        EventKind::CasualEvent,
        EventKind::Trade,
        EventKind::Encounter,
        EventKind::Battle,
        EventKind::Continuation,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            EventKind::CasualEvent => "Casual Event",
            EventKind::Trade => "Trade",
            EventKind::Encounter => "Encounter",
            EventKind::Battle => "Battle",
            EventKind::Continuation => "None",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// The classifier reply contained none of the keywords.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Classifier reply has no event keyword: {response:?}")]
pub struct ClassificationError {
    pub response: String,
}

/// Map a classifier reply to an event kind. Keywords are case-sensitive.
pub fn classify_response(response: &str) -> Result<EventKind, ClassificationError> {
    EventKind::PRIORITY
        .into_iter()
        .find(|kind| response.contains(kind.keyword()))
        .ok_or_else(|| ClassificationError {
            response: response.to_string(),
        })
}

/// Ask the generator what the latest action leads to.
pub async fn classify(gateway: &dyn Generator, story: &Story) -> Result<EventKind, TurnError> {
    let prompt = prompts::classify(&StoryContext::from_story(story));
    let response = gateway.generate(&[Message::user(prompt)], false).await?;
    match classify_response(&response) {
        Ok(kind) => {
            tracing::info!(%kind, "Classified turn");
            Ok(kind)
        }
        Err(e) => {
            tracing::warn!(response = %response.trim(), "Classifier named no event kind");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_keywords() {
        assert_eq!(classify_response("Battle"), Ok(EventKind::Battle));
        assert_eq!(classify_response("Encounter."), Ok(EventKind::Encounter));
        assert_eq!(classify_response("Casual Event"), Ok(EventKind::CasualEvent));
        assert_eq!(classify_response("Trade"), Ok(EventKind::Trade));
        assert_eq!(classify_response("None"), Ok(EventKind::Continuation));
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(classify_response("Trade or Battle"), Ok(EventKind::Trade));
        assert_eq!(
            classify_response("Battle, maybe an Encounter"),
            Ok(EventKind::Encounter)
        );
        assert_eq!(
            classify_response("None... actually a Casual Event"),
            Ok(EventKind::CasualEvent)
        );
    }

    #[test]
    fn test_case_sensitive_and_unmatched() {
        assert!(classify_response("battle").is_err());
        assert_eq!(
            classify_response("I am not sure"),
            Err(ClassificationError {
                response: "I am not sure".into()
            })
        );
    }
}
