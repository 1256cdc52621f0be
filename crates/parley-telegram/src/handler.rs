//! Message handler: access gate, commands, and relay dispatch.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use parley_llm::{ChatClient, OpenAiChatClient};

use crate::allowlist::{resolve_grant_target, AccessGate, ChatKind, GrantTarget};
use crate::config::BotConfig;
use crate::outbound::TelegramOutbound;
use crate::relay::Relay;

/// Shared bot state passed to all handlers.
#[derive(Clone)]
pub struct BotState {
    pub gate: Arc<AccessGate>,
    pub client: Arc<OpenAiChatClient>,
    pub relay: Arc<Relay<Arc<OpenAiChatClient>, TelegramOutbound>>,
    pub config: Arc<BotConfig>,
}

/// Handle an incoming message.
///
/// Errors returned from here are funneled to the owner error sink by
/// the dispatcher wrapper in `bot`; they never reach the end user.
pub async fn handle_message(bot: Bot, msg: Message, state: BotState) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    if text.starts_with('/') {
        return handle_command(&bot, &msg, text, &state).await;
    }

    if !sender_allowed(&state, &msg) {
        info!(chat = chat_id.0, "sender not allowed to use the bot");
        bot.send_message(chat_id, state.config.disallowed_message())
            .await?;
        return Ok(());
    }

    info!(chat = chat_id.0, "new message received");
    state.relay.handle(chat_id, msg.id, text).await;
    Ok(())
}

/// Handle bot commands, matched on the first whitespace token.
async fn handle_command(
    bot: &Bot,
    msg: &Message,
    text: &str,
    state: &BotState,
) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    let cmd = text.split_whitespace().next().unwrap_or("");

    match cmd {
        "/start" => {
            if !sender_allowed(state, msg) {
                info!(chat = chat_id.0, "sender not allowed to start the bot");
                bot.send_message(chat_id, state.config.disallowed_message())
                    .await?;
                return Ok(());
            }
            info!("bot started");
            bot.send_message(chat_id, "I'm a ChatGPT bot, please talk to me!")
                .await?;
        },
        "/reset" => {
            if !sender_allowed(state, msg) {
                bot.send_message(chat_id, state.config.disallowed_message())
                    .await?;
                return Ok(());
            }
            info!("resetting the conversation");
            state.client.reset_conversation().await;
            bot.send_message(chat_id, "Done!").await?;
        },
        "/allow" => {
            handle_allow(bot, msg, text, state).await?;
        },
        "/help" => {
            bot.send_message(
                chat_id,
                "/start - Start the bot\n\
                 /reset - Reset conversation\n\
                 /allow - Add a user or group to whitelist\n\
                 /help - Help menu",
            )
            .await?;
        },
        _ => {
            bot.send_message(chat_id, "Unknown command. Try /help.")
                .await?;
        },
    }

    Ok(())
}

/// Handle `/allow`: resolve the grant target and record it.
///
/// Taxonomy failures (`Unauthorized`, `FeatureDisabled`, `NotAGroup`,
/// `MissingArgument`) are replied directly to the issuer; anything
/// else propagates to the owner error sink.
async fn handle_allow(
    bot: &Bot,
    msg: &Message,
    text: &str,
    state: &BotState,
) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    let actor = sender_id(msg).unwrap_or(UNKNOWN_SENDER);

    let result = state.gate.authorize_grant(actor).and_then(|()| {
        let reply_author = msg
            .reply_to_message()
            .and_then(|replied| replied.from.as_ref())
            .map(|user| user.id.0.to_string());
        let arg = text.split_whitespace().nth(1);
        let kind = if msg.chat.is_group() || msg.chat.is_supergroup() {
            ChatKind::Group
        } else {
            ChatKind::Private
        };
        let target = resolve_grant_target(reply_author.as_deref(), arg, kind, chat_id.0)?;
        state.gate.grant(actor, &target)?;
        Ok(target)
    });

    match result {
        Ok(GrantTarget::User(id)) => {
            info!(id, "user added to whitelist");
            bot.send_message(chat_id, "Added the user to whitelist.")
                .await?;
        },
        Ok(GrantTarget::Group(id)) => {
            info!(id, "group added to whitelist");
            bot.send_message(chat_id, "Added this group to whitelist.")
                .await?;
        },
        Err(e) if e.is_user_facing() => {
            bot.send_message(chat_id, e.to_string()).await?;
        },
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Sentinel for updates with no sender (channel posts and the like):
/// never on a user allow-list, so only a group grant can admit them.
const UNKNOWN_SENDER: i64 = -1;

fn sender_id(msg: &Message) -> Option<i64> {
    msg.from
        .as_ref()
        .and_then(|user| i64::try_from(user.id.0).ok())
}

fn sender_allowed(state: &BotState, msg: &Message) -> bool {
    state
        .gate
        .is_allowed(sender_id(msg).unwrap_or(UNKNOWN_SENDER), msg.chat.id.0)
}
