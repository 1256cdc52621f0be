//! parley Telegram bot — binary entry point.
//!
//! Relays chat messages to a ChatGPT-style API and streams or batches
//! the reply back, gated by an optional allow-list.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,parley_telegram=info")),
        )
        .init();

    let config = parley_telegram::config::BotConfig::from_env()?;
    Box::pin(parley_telegram::bot::run(config)).await
}
