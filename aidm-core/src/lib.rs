//! Turn-based narrative role-playing engine.
//!
//! A text generator writes the story; this crate keeps the game honest
//! around it. It provides:
//! - Attribute dice pools and a restricted success-condition language
//! - Extraction of stats, options and rewards from generated prose
//! - Battle, encounter, casual event, trade and continuation turns
//! - Plain-text save files and a slash-command shell
//!
//! # Quick Start
//!
//! ```ignore
//! use aidm_core::{ClaudeGateway, GameRule, RandomDice, RetryPolicy, RetryingGenerator, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = aidm_llm::Client::from_env(Default::default())?;
//!     let gateway = RetryingGenerator::new(
//!         ClaudeGateway::new(client, Default::default()),
//!         RetryPolicy::default(),
//!     );
//!
//!     let mut session = Session::new(
//!         Box::new(gateway),
//!         Box::new(my_terminal),
//!         Box::new(RandomDice::new()),
//!         GameRule::default(),
//!         SessionConfig::default(),
//!     );
//!     session.run(None).await?;
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod condition;
pub mod dice;
pub mod extract;
pub mod gateway;
pub mod persist;
pub mod prompts;
pub mod rules;
pub mod session;
pub mod shell;
pub mod testing;
pub mod turns;
pub mod world;

// Primary public API
pub use classify::{classify_response, ClassificationError, EventKind};
pub use condition::{ConditionError, SuccessCondition};
pub use dice::{DiceSource, RandomDice};
pub use extract::ExtractionError;
pub use gateway::{
    ClaudeGateway, GatewayConfig, GenerationError, Generator, RetryPolicy, RetryingGenerator,
};
pub use persist::{PersistenceError, SaveStore};
pub use rules::{GameRule, RuleError};
pub use session::{Session, SessionConfig, SessionEnd, SessionError};
pub use shell::Terminal;
pub use turns::{Turn, TurnError, TurnOutcome};
pub use world::{Character, Skill, Story, StoryError};
