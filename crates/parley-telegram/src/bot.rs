//! Teloxide bot setup, dispatcher, and handler registration.

use std::sync::Arc;

use teloxide::dptree;
use teloxide::prelude::*;
use tracing::{info, warn};

use parley_llm::OpenAiChatClient;

use crate::allowlist::{AccessGate, AllowListStore};
use crate::config::BotConfig;
use crate::handler::{self, BotState};
use crate::outbound::TelegramOutbound;
use crate::relay::Relay;
use crate::report;

/// Build the chat client from configuration.
fn build_client(config: &BotConfig) -> OpenAiChatClient {
    match &config.openai_base_url {
        Some(base_url) => OpenAiChatClient::custom(
            base_url,
            config.openai_api_key.as_deref(),
            &config.openai_model,
        ),
        None => OpenAiChatClient::openai(
            config.openai_api_key.as_deref().unwrap_or_default(),
            &config.openai_model,
        ),
    }
}

/// Build `BotState` and the teloxide handler tree from a config.
fn build_state_and_handler(
    config: BotConfig,
) -> (Bot, teloxide::dispatching::UpdateHandler<anyhow::Error>) {
    if !config.whitelist_enabled {
        warn!(
            "whitelist mode is OFF — any Telegram user can talk to the bot. \
             Set WHITELIST_MODE to restrict access."
        );
    }

    let bot = Bot::new(&config.bot_token);

    let gate = Arc::new(AccessGate::new(
        AllowListStore::new(config.users_file()),
        AllowListStore::new(config.groups_file()),
        config.whitelist_enabled,
        config.owner_id,
    ));
    let client = Arc::new(build_client(&config));
    let relay = Arc::new(Relay::new(
        Arc::clone(&client),
        TelegramOutbound::new(bot.clone()),
        config.stream_mode,
    ));

    let state = BotState {
        gate,
        client,
        relay,
        config: Arc::new(config),
    };

    let message_handler = Update::filter_message().endpoint({
        let state = state.clone();
        move |bot: Bot, msg: Message| {
            let state = state.clone();
            async move {
                let owner_id = state.config.owner_id;
                // One failing update must not crash the dispatch loop:
                // report to the owner and swallow.
                if let Err(e) = Box::pin(handler::handle_message(bot.clone(), msg, state)).await {
                    warn!(error = ?e, "error while handling an update");
                    report::report_error(&bot, owner_id, &e).await;
                }
                Ok::<(), anyhow::Error>(())
            }
        }
    });

    (bot, dptree::entry().branch(message_handler))
}

/// Run the Telegram bot until shutdown.
pub async fn run(config: BotConfig) -> anyhow::Result<()> {
    let (bot, handler) = build_state_and_handler(config);

    info!("starting Telegram bot...");
    Box::pin(
        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch(),
    )
    .await;

    info!("bot stopped");
    Ok(())
}
