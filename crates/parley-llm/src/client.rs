//! Chat client trait.
//!
//! Defines the seam between the bot and the remote conversational API.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::error::LlmResult;
use crate::types::{ChatResponse, StreamChunk};

/// Type alias for a boxed stream of cumulative reply chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = LlmResult<StreamChunk>> + Send>>;

/// A conversational API client.
///
/// Implementors hold whatever conversation state the remote API needs;
/// callers only supply the new user prompt.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Ask for one complete reply.
    async fn ask(&self, prompt: &str) -> LlmResult<ChatResponse>;

    /// Ask for a streamed reply.
    ///
    /// Each yielded [`StreamChunk`] carries the full cumulative text of
    /// the reply so far, with a monotonically increasing index.
    async fn ask_stream(&self, prompt: &str) -> LlmResult<ChunkStream>;

    /// Discard the current conversation state.
    async fn reset_conversation(&self);
}

/// Blanket implementation so a shared `Arc<C>` can be used wherever a
/// `ChatClient` is required.
#[async_trait]
impl<C: ChatClient + ?Sized> ChatClient for Arc<C> {
    async fn ask(&self, prompt: &str) -> LlmResult<ChatResponse> {
        (**self).ask(prompt).await
    }

    async fn ask_stream(&self, prompt: &str) -> LlmResult<ChunkStream> {
        (**self).ask_stream(prompt).await
    }

    async fn reset_conversation(&self) {
        (**self).reset_conversation().await;
    }
}
