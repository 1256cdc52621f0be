//! Outbound delivery seam.
//!
//! The relay never calls teloxide directly; it goes through [`Outbound`]
//! so tests can observe the exact send/typing/edit sequence and so
//! delivery errors can be classified once, in one place.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ReplyParameters};
use thiserror::Error;

/// A failed delivery operation, classified for the relay's retry logic.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Rate limited by Telegram.
    #[error("rate limited, retry after {0}s")]
    RetryAfter(u64),

    /// Request rejected in a way that resolves itself (e.g. editing a
    /// message to its current text).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Anything else.
    #[error("delivery error: {0}")]
    Other(String),
}

impl DeliveryError {
    /// Whether the periodic edit loop should swallow this error
    /// silently instead of logging it.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RetryAfter(_) | Self::BadRequest(_) | Self::Network(_)
        )
    }
}

impl From<teloxide::RequestError> for DeliveryError {
    fn from(e: teloxide::RequestError) -> Self {
        use teloxide::ApiError;
        use teloxide::RequestError;
        match e {
            RequestError::RetryAfter(secs) => Self::RetryAfter(secs.seconds().into()),
            RequestError::Network(e) => Self::Network(e.to_string()),
            RequestError::Io(e) => Self::Network(e.to_string()),
            RequestError::Api(ApiError::MessageNotModified) => {
                Self::BadRequest("message is not modified".to_string())
            },
            other => Self::Other(other.to_string()),
        }
    }
}

/// Outbound message operations used by the relay.
#[async_trait]
pub trait Outbound: Clone + Send + Sync + 'static {
    /// Signal "typing" to the chat.
    async fn send_typing(&self, chat: ChatId) -> Result<(), DeliveryError>;

    /// Send a message, optionally as a reply, optionally HTML-formatted.
    /// Returns the id of the created message.
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        html: bool,
    ) -> Result<MessageId, DeliveryError>;

    /// Replace the text of an existing message.
    async fn edit_message(
        &self,
        chat: ChatId,
        msg: MessageId,
        text: &str,
        html: bool,
    ) -> Result<(), DeliveryError>;
}

/// The real implementation over a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    /// Wrap a bot handle.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn send_typing(&self, chat: ChatId) -> Result<(), DeliveryError> {
        self.bot
            .send_chat_action(chat, teloxide::types::ChatAction::Typing)
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        html: bool,
    ) -> Result<MessageId, DeliveryError> {
        let mut request = self.bot.send_message(chat, text);
        if let Some(msg_id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(msg_id));
        }
        if html {
            request = request.parse_mode(ParseMode::Html);
        }
        let sent = request.await?;
        Ok(sent.id)
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        msg: MessageId,
        text: &str,
        html: bool,
    ) -> Result<(), DeliveryError> {
        let mut request = self.bot.edit_message_text(chat, msg, text);
        if html {
            request = request.parse_mode(ParseMode::Html);
        }
        request.await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_is_transient() {
        assert!(DeliveryError::RetryAfter(30).is_transient());
    }

    #[test]
    fn bad_request_is_transient() {
        assert!(DeliveryError::BadRequest("message is not modified".to_string()).is_transient());
    }

    #[test]
    fn network_is_transient() {
        assert!(DeliveryError::Network("connection reset".to_string()).is_transient());
    }

    #[test]
    fn other_is_not_transient() {
        assert!(!DeliveryError::Other("chat not found".to_string()).is_transient());
    }

    #[test]
    fn message_not_modified_maps_to_bad_request() {
        let err: DeliveryError = teloxide::RequestError::Api(
            teloxide::ApiError::MessageNotModified,
        )
        .into();
        assert!(matches!(err, DeliveryError::BadRequest(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn unknown_api_error_maps_to_other() {
        let err: DeliveryError =
            teloxide::RequestError::Api(teloxide::ApiError::BotBlocked).into();
        assert!(matches!(err, DeliveryError::Other(_)));
        assert!(!err.is_transient());
    }
}
