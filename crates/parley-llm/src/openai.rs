//! OpenAI-compatible chat client implementation.
//!
//! Works with:
//! - `OpenAI` API
//! - LM Studio / Ollama / vLLM (`OpenAI` compatibility mode)
//! - Any `OpenAI`-compatible chat-completions endpoint

use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::client::{ChatClient, ChunkStream};
use crate::error::{LlmError, LlmResult};
use crate::types::{ChatResponse, Message, StreamChunk};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat client.
///
/// Keeps a linear conversation history so consecutive prompts share
/// context; [`ChatClient::reset_conversation`] clears it. The remote
/// API's own session mechanics stay on the remote side.
pub struct OpenAiChatClient {
    client: Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
    system_prompt: Option<String>,
    history: Arc<Mutex<Vec<Message>>>,
}

impl OpenAiChatClient {
    /// Create a client for the `OpenAI` API.
    #[must_use]
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::custom(DEFAULT_OPENAI_URL, Some(api_key), model)
    }

    /// Create a client for a custom OpenAI-compatible endpoint.
    #[must_use]
    pub fn custom(base_url: &str, api_key: Option<&str>, model: &str) -> Self {
        Self {
            client: Client::new(),
            model: model.to_string(),
            base_url: base_url.to_string(),
            api_key: api_key.map(ToString::to_string),
            system_prompt: None,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set a system prompt prepended to every request.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Build the request body from a history snapshot.
    fn build_request(&self, history: &[Message], stream: bool) -> Value {
        let mut messages = Vec::new();

        if let Some(system) = &self.system_prompt {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system
            }));
        }

        for msg in history {
            messages.push(serde_json::json!({
                "role": msg.role,
                "content": msg.content
            }));
        }

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream
        })
    }

    /// Send the request, returning the raw response after status checks.
    async fn send_request(&self, body: &Value) -> LlmResult<reqwest::Response> {
        if self.api_key.as_ref().is_none_or(String::is_empty) && !is_local_url(&self.base_url) {
            return Err(LlmError::ApiKeyNotConfigured {
                endpoint: self.base_url.clone(),
            });
        }

        let mut request = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json");

        if let Some(api_key) = &self.api_key {
            let mut auth_value =
                reqwest::header::HeaderValue::try_from(format!("Bearer {api_key}"))
                    .map_err(|e| LlmError::ApiRequestFailed(format!("invalid API key: {e}")))?;
            auth_value.set_sensitive(true);
            request = request.header("Authorization", auth_value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "chat API error");
            return Err(LlmError::InvalidResponse(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn ask(&self, prompt: &str) -> LlmResult<ChatResponse> {
        // The history lock is never held across the network awaits:
        // a hung endpoint must stall only this call, not every other
        // conversation sharing the client.
        let body = {
            let mut history = self.history.lock().await;
            history.push(Message::user(prompt));
            self.build_request(&history, false)
        };
        debug!(model = %self.model, "requesting batch completion");

        let result = async {
            let response = self.send_request(&body).await?;
            let parsed: CompletionResponse = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))
        }
        .await;

        match result {
            Ok(text) => {
                self.history.lock().await.push(Message::assistant(&text));
                Ok(ChatResponse { message: text })
            },
            Err(e) => {
                // Drop the unanswered prompt so a failed call doesn't
                // poison the next one.
                self.history.lock().await.pop();
                Err(e)
            },
        }
    }

    async fn ask_stream(&self, prompt: &str) -> LlmResult<ChunkStream> {
        {
            let mut history = self.history.lock().await;
            history.push(Message::user(prompt));
        }

        let body = {
            let history = self.history.lock().await;
            self.build_request(&history, true)
        };
        debug!(model = %self.model, "starting streamed completion");

        let response = match self.send_request(&body).await {
            Ok(resp) => resp,
            Err(e) => {
                self.history.lock().await.pop();
                return Err(e);
            },
        };

        let history = Arc::clone(&self.history);
        let stream = try_stream! {
            use futures::StreamExt;

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut cumulative = String::new();
            let mut index = 0usize;

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::StreamingError(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete SSE events (separated by a blank line).
                while let Some(event_end) = buffer.find("\n\n") {
                    let event = buffer[..event_end].to_string();
                    buffer.drain(..event_end.saturating_add(2));

                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        if data.trim() == "[DONE]" {
                            break 'outer;
                        }
                        if let Some(delta) = parse_stream_delta(data) {
                            cumulative.push_str(&delta);
                            yield StreamChunk {
                                index,
                                message: cumulative.clone(),
                            };
                            index = index.saturating_add(1);
                        }
                    }
                }
            }

            if !cumulative.is_empty() {
                history.lock().await.push(Message::assistant(&cumulative));
            }
        };

        Ok(Box::pin(stream))
    }

    async fn reset_conversation(&self) {
        self.history.lock().await.clear();
    }
}

impl std::fmt::Debug for OpenAiChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

/// Extract the content delta from one SSE `data:` payload, if any.
fn parse_stream_delta(data: &str) -> Option<String> {
    let event: StreamEvent = serde_json::from_str(data).ok()?;
    let content = event.choices.first()?.delta.content.as_ref()?;
    if content.is_empty() {
        None
    } else {
        Some(content.clone())
    }
}

/// Check whether a URL points to a local endpoint where an API key is
/// typically not required.
fn is_local_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("localhost") || lower.contains("127.0.0.1") || lower.contains("[::1]")
}

// Wire types (batch)

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

// Wire types (streaming)

#[derive(Debug, Deserialize)]
struct StreamEvent {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
