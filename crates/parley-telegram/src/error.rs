//! Error types for the Telegram bot.
//!
//! The first four variants are user-facing: their `Display` strings are
//! replied verbatim to the issuer of a failed command.

use thiserror::Error;

/// Errors produced by the Telegram bot.
#[derive(Debug, Error)]
pub enum BotError {
    /// A privileged command was invoked by someone other than the owner.
    #[error("You are not allowed to use this command.")]
    Unauthorized,

    /// A whitelist command was used while whitelisting is off.
    #[error("Whitelist mode is off.")]
    FeatureDisabled,

    /// A group grant was attempted outside a multi-user chat.
    #[error("Current chat is not a group.")]
    NotAGroup,

    /// A grant command was issued with no target.
    #[error("Please specify a user or group first.")]
    MissingArgument,

    /// Allow-list store I/O failed.
    #[error("allow-list store error: {0}")]
    Store(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias.
pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    /// Whether this error should be replied directly to the command
    /// issuer rather than reported to the owner.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::FeatureDisabled | Self::NotAGroup | Self::MissingArgument
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unauthorized() {
        assert_eq!(
            BotError::Unauthorized.to_string(),
            "You are not allowed to use this command."
        );
    }

    #[test]
    fn error_display_feature_disabled() {
        assert_eq!(BotError::FeatureDisabled.to_string(), "Whitelist mode is off.");
    }

    #[test]
    fn error_display_not_a_group() {
        assert_eq!(
            BotError::NotAGroup.to_string(),
            "Current chat is not a group."
        );
    }

    #[test]
    fn error_display_missing_argument() {
        assert_eq!(
            BotError::MissingArgument.to_string(),
            "Please specify a user or group first."
        );
    }

    #[test]
    fn taxonomy_errors_are_user_facing() {
        assert!(BotError::Unauthorized.is_user_facing());
        assert!(BotError::FeatureDisabled.is_user_facing());
        assert!(BotError::NotAGroup.is_user_facing());
        assert!(BotError::MissingArgument.is_user_facing());
    }

    #[test]
    fn internal_errors_are_not_user_facing() {
        let io = BotError::Store(std::io::Error::other("disk gone"));
        assert!(!io.is_user_facing());
        assert!(!BotError::Config("missing token".to_string()).is_user_facing());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BotError>();
    }
}
