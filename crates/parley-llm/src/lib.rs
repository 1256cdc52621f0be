//! ChatGPT-style conversational API client for parley.
//!
//! Exposes a [`ChatClient`] trait with two modes of obtaining a reply:
//! a single batched response ([`ChatClient::ask`]) and an incremental
//! stream of cumulative text fragments ([`ChatClient::ask_stream`]),
//! plus [`OpenAiChatClient`], an implementation backed by any
//! OpenAI-compatible chat-completions endpoint.

pub mod client;
pub mod error;
pub mod openai;
pub mod types;

pub use client::{ChatClient, ChunkStream};
pub use error::{LlmError, LlmResult};
pub use openai::OpenAiChatClient;
pub use types::{ChatResponse, Message, MessageRole, StreamChunk};
