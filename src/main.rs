// This is the entry point of the console moderation service.
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the background mute sweep
// 4. Feed stdin lines through the console transport

use anyhow::Context;
use chat_moderation::console::ConsoleTransport;
use chat_moderation::core::moderation::ModerationPipeline;
use chat_moderation::infra::clock::SystemClock;
use chat_moderation::infra::config::load_config;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging on stderr so stdout only carries decisions
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = load_config().context("Failed to load moderation config")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let pipeline = Arc::new(
        ModerationPipeline::new(config, SystemClock)
            .context("Failed to initialize moderation pipeline")?,
    );
    let transport = ConsoleTransport::new(Arc::clone(&pipeline), SystemClock);

    // Expired mutes are evicted lazily on read; this only keeps the map tidy
    let sweep_secs = std::env::var("MODERATION_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    if sweep_secs > 0 {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
            loop {
                interval.tick().await;
                pipeline.sweep_expired_mutes();
            }
        });
    }

    tracing::info!("Reading chat lines from stdin (user_id|user_name|content or /command)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if let Some(output) = transport.handle_line(&line) {
            println!("{}", output);
        }
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}
