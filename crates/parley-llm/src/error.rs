//! Chat API error types.

use thiserror::Error;

/// Errors that can occur when talking to the remote chat API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API key not configured for a remote endpoint.
    #[error("API key not configured for {endpoint}")]
    ApiKeyNotConfigured {
        /// Endpoint that requires a key.
        endpoint: String,
    },

    /// API request failed before a response was received.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// Invalid response from the API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Error while consuming the response stream.
    #[error("Streaming error: {0}")]
    StreamingError(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Result type for chat API operations.
pub type LlmResult<T> = Result<T, LlmError>;
