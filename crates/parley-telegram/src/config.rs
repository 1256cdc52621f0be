//! Configuration for the Telegram bot.
//!
//! Everything comes from environment variables; there is no config
//! file. Flag-style variables (`WHITELIST_MODE`, `STREAM_MODE`) are
//! enabled by being present and non-empty, matching the original
//! deployment convention.

use std::path::PathBuf;

use crate::error::{BotError, BotResult};

/// Telegram bot configuration.
#[derive(Clone)]
pub struct BotConfig {
    /// Telegram Bot API token (from `@BotFather`).
    pub bot_token: String,
    /// Telegram user ID of the bot owner. The owner may grant access
    /// and receives error reports in their private chat.
    pub owner_id: i64,
    /// Owner display name, shown in the "not allowed" reply.
    pub owner_username: String,
    /// Whether allow-list enforcement is active.
    pub whitelist_enabled: bool,
    /// Whether replies stream incrementally instead of arriving whole.
    pub stream_mode: bool,
    /// Directory holding the two allow-list files.
    pub data_dir: PathBuf,
    /// API key for the remote chat endpoint.
    pub openai_api_key: Option<String>,
    /// Model name for the remote chat endpoint.
    pub openai_model: String,
    /// Override for the remote chat endpoint URL.
    pub openai_base_url: Option<String>,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("owner_username", &self.owner_username)
            .field("whitelist_enabled", &self.whitelist_enabled)
            .field("stream_mode", &self.stream_mode)
            .field("data_dir", &self.data_dir)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .finish()
    }
}

impl BotConfig {
    /// Load configuration from the process environment.
    ///
    /// Required: `TELEGRAM_BOT_TOKEN`, `OWNER_ID`. Optional:
    /// `OWNER_USERNAME`, `WHITELIST_MODE`, `STREAM_MODE`,
    /// `PARLEY_DATA_DIR`, `OPENAI_API_KEY`, `OPENAI_MODEL`,
    /// `OPENAI_BASE_URL`.
    pub fn from_env() -> BotResult<Self> {
        let bot_token = require_var("TELEGRAM_BOT_TOKEN")?;
        let owner_id = require_var("OWNER_ID")?
            .parse::<i64>()
            .map_err(|e| BotError::Config(format!("OWNER_ID is not a valid id: {e}")))?;

        Ok(Self {
            bot_token,
            owner_id,
            owner_username: non_empty_var("OWNER_USERNAME").unwrap_or_default(),
            whitelist_enabled: flag_var("WHITELIST_MODE"),
            stream_mode: flag_var("STREAM_MODE"),
            data_dir: non_empty_var("PARLEY_DATA_DIR")
                .map_or_else(|| PathBuf::from("."), PathBuf::from),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: non_empty_var("OPENAI_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_base_url: non_empty_var("OPENAI_BASE_URL"),
        })
    }

    /// Path of the user allow-list file.
    #[must_use]
    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.txt")
    }

    /// Path of the group allow-list file.
    #[must_use]
    pub fn groups_file(&self) -> PathBuf {
        self.data_dir.join("groups.txt")
    }

    /// The reply sent to senders who are not on the allow-list.
    #[must_use]
    pub fn disallowed_message(&self) -> String {
        format!(
            "Sorry, you are not allowed to use this bot, please contact @{} to request permissions.",
            self.owner_username
        )
    }
}

fn require_var(name: &str) -> BotResult<String> {
    non_empty_var(name).ok_or_else(|| BotError::Config(format!("{name} is required")))
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Flag semantics: enabled iff the variable is present and non-empty.
fn flag_var(name: &str) -> bool {
    non_empty_var(name).is_some()
}
