//! Terminal front end for the aidm narrative engine.
//!
//! ```bash
//! export ANTHROPIC_API_KEY=...
//! cargo run -p aidm -- --save-dir saves
//! cargo run -p aidm -- --save-dir saves --load my_game
//! ```

mod console;

use aidm_core::{
    ClaudeGateway, GameRule, GatewayConfig, RandomDice, RetryPolicy, RetryingGenerator, Session,
    SessionConfig, SessionEnd,
};
use aidm_llm::{Client, ClientConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::Console;

#[derive(Parser)]
#[command(
    name = "aidm",
    about = "A text adventure with a language model as the dungeon master",
    version
)]
struct Args {
    /// Model to narrate with (overrides AIDM_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Directory for /save and /read
    #[arg(long, default_value = ".")]
    save_dir: PathBuf,

    /// JSON file with the starting game rules
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Resume the saved game with this name
    #[arg(long)]
    load: Option<String>,

    /// Timeout for a single generation request, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Attempts per generation before giving up on transient errors
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.verbose {
        "aidm=debug,aidm_core=debug,aidm_llm=debug"
    } else {
        "aidm=warn,aidm_core=warn,aidm_llm=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let rule = match &args.rules {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("Could not read rules file {}: {e}", path.display()))?;
            GameRule::from_json(&json)?
        }
        None => GameRule::default(),
    };

    let mut client_config =
        ClientConfig::default().with_request_timeout(Duration::from_secs(args.timeout_secs));
    if let Ok(base_url) = std::env::var("AIDM_BASE_URL") {
        client_config = client_config.with_base_url(base_url);
    }
    if let Some(model) = args.model.or_else(|| std::env::var("AIDM_MODEL").ok()) {
        client_config = client_config.with_model(model);
    }

    let client = Client::from_env(client_config).map_err(|e| {
        format!("{e}. Set ANTHROPIC_API_KEY in the environment or a .env file.")
    })?;
    tracing::info!(model = client.model(), "Starting aidm");

    let gateway = RetryingGenerator::new(
        ClaudeGateway::new(client, GatewayConfig::default()),
        RetryPolicy {
            max_attempts: args.max_retries.max(1),
            ..RetryPolicy::default()
        },
    );

    let mut session = Session::new(
        Box::new(gateway),
        Box::new(Console::new()),
        Box::new(RandomDice::new()),
        rule,
        SessionConfig::default().with_save_dir(args.save_dir),
    );

    match session.run(args.load.as_deref()).await? {
        SessionEnd::PlayerDefeated => tracing::info!("Session ended with the player defeated"),
        SessionEnd::InputClosed => println!("\nFarewell, adventurer."),
    }
    Ok(())
}
