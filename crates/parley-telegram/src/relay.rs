//! Response relay: one inbound message in, one reply out.
//!
//! Two modes, selected by configuration. Batch mode keeps a typing
//! indicator alive while one remote call completes, then sends the
//! whole reply. Streaming mode creates the reply message on the first
//! chunk and edits it in place as the cumulative text grows, applying
//! rich-text formatting only once the stream has ended.

use std::time::Duration;

use parley_llm::{ChatClient, StreamChunk};
use teloxide::types::{ChatId, MessageId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::format::{close_open_tags, md_to_telegram_html};
use crate::outbound::Outbound;

/// Interval between typing-indicator refreshes.
const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// Interval between in-place edits of a streaming reply.
const EDIT_INTERVAL: Duration = Duration::from_millis(500);

/// Reply sent when the remote chat API fails.
pub const FALLBACK_REPLY: &str =
    "I'm having some trouble talking to you, please try again later.";

/// Relays one inbound message to the chat API and the reply back.
pub struct Relay<C, O> {
    client: C,
    outbound: O,
    streaming: bool,
}

/// Ephemeral state of one reply-in-progress.
///
/// Owns the two background tasks so they are cancelled on every exit
/// path; `Drop` aborts whatever is still running.
struct RelaySession {
    typing: Option<JoinHandle<()>>,
    edit: Option<JoinHandle<()>>,
    message: Option<MessageId>,
}

impl RelaySession {
    fn new(typing: JoinHandle<()>) -> Self {
        Self {
            typing: Some(typing),
            edit: None,
            message: None,
        }
    }

    /// Stop the typing indicator. Called the moment the first content
    /// is ready to display.
    fn cancel_typing(&mut self) {
        if let Some(task) = self.typing.take() {
            task.abort();
        }
    }

    /// Stop the periodic edit loop. Called when the chunk stream ends.
    fn cancel_edit(&mut self) {
        if let Some(task) = self.edit.take() {
            task.abort();
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.cancel_typing();
        self.cancel_edit();
    }
}

impl<C: ChatClient, O: Outbound> Relay<C, O> {
    /// Create a relay. `streaming` selects the operating mode.
    pub fn new(client: C, outbound: O, streaming: bool) -> Self {
        Self {
            client,
            outbound,
            streaming,
        }
    }

    /// Drive one reply for one inbound message.
    ///
    /// Remote-API failures never propagate: the user sees the fallback
    /// text instead.
    pub async fn handle(&self, chat: ChatId, reply_to: MessageId, text: &str) {
        if self.streaming {
            self.handle_streaming(chat, reply_to, text).await;
        } else {
            self.handle_batch(chat, reply_to, text).await;
        }
    }

    async fn handle_batch(&self, chat: ChatId, reply_to: MessageId, text: &str) {
        let mut session = RelaySession::new(spawn_typing_loop(self.outbound.clone(), chat));

        let result = self.client.ask(text).await;
        session.cancel_typing();

        let (reply, html) = match result {
            Ok(response) => {
                let html = close_open_tags(&md_to_telegram_html(&response.message));
                (html, true)
            },
            Err(e) => {
                warn!(error = %e, "chat API call failed");
                (FALLBACK_REPLY.to_string(), false)
            },
        };

        if let Err(e) = self
            .outbound
            .send_message(chat, &reply, Some(reply_to), html)
            .await
        {
            warn!(error = %e, "failed to send reply");
        }
    }

    async fn handle_streaming(&self, chat: ChatId, reply_to: MessageId, text: &str) {
        use futures::StreamExt;

        let mut session = RelaySession::new(spawn_typing_loop(self.outbound.clone(), chat));

        let mut stream = match self.client.ask_stream(text).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "failed to open chat API stream");
                session.cancel_typing();
                self.send_fallback(chat, reply_to).await;
                return;
            },
        };

        let (latest_tx, latest_rx) = watch::channel(String::new());
        let mut last_text = String::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    last_text.clone_from(&chunk.message);
                    latest_tx.send_replace(chunk.message.clone());
                    if session.message.is_none() {
                        self.open_reply(&mut session, chat, reply_to, &chunk, &latest_rx)
                            .await;
                    }
                },
                Err(e) => {
                    // The final edit below still lands whatever text
                    // arrived before the failure.
                    warn!(error = %e, "chat API stream failed mid-reply");
                    break;
                },
            }
        }

        session.cancel_edit();
        session.cancel_typing();

        match session.message {
            Some(msg_id) => {
                // Formatting is deferred to this last edit: partial
                // markup in intermediate text can render incorrectly.
                let html = close_open_tags(&md_to_telegram_html(&last_text));
                match self.outbound.edit_message(chat, msg_id, &html, true).await {
                    Ok(()) => {},
                    Err(e) if e.is_transient() => {},
                    Err(e) => warn!(error = %e, "final edit failed"),
                }
                info!("streamed reply complete");
            },
            // Stream ended without producing any content.
            None => self.send_fallback(chat, reply_to).await,
        }
    }

    /// First chunk: stop the typing indicator, create the visible
    /// message, and start the edit loop over the watch channel.
    async fn open_reply(
        &self,
        session: &mut RelaySession,
        chat: ChatId,
        reply_to: MessageId,
        chunk: &StreamChunk,
        latest_rx: &watch::Receiver<String>,
    ) {
        session.cancel_typing();
        match self
            .outbound
            .send_message(chat, &chunk.message, Some(reply_to), false)
            .await
        {
            Ok(msg_id) => {
                session.message = Some(msg_id);
                session.edit = Some(spawn_edit_loop(
                    self.outbound.clone(),
                    chat,
                    msg_id,
                    latest_rx.clone(),
                    chunk.message.clone(),
                ));
            },
            Err(e) => {
                warn!(error = %e, "failed to send initial streamed message");
            },
        }
    }

    async fn send_fallback(&self, chat: ChatId, reply_to: MessageId) {
        if let Err(e) = self
            .outbound
            .send_message(chat, FALLBACK_REPLY, Some(reply_to), false)
            .await
        {
            warn!(error = %e, "failed to send fallback reply");
        }
    }
}

/// Signal "typing" to the chat every [`TYPING_INTERVAL`] until aborted.
fn spawn_typing_loop<O: Outbound>(outbound: O, chat: ChatId) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = outbound.send_typing(chat).await {
                debug!(error = %e, "typing indicator failed");
            }
            tokio::time::sleep(TYPING_INTERVAL).await;
        }
    })
}

/// Every [`EDIT_INTERVAL`], replace the displayed text with the latest
/// cumulative text if it changed. Runs until aborted.
///
/// Intermediate edits are plain text; transient delivery errors (rate
/// limiting, no-op edits, transport hiccups) are swallowed, anything
/// else is logged and the loop keeps going.
fn spawn_edit_loop<O: Outbound>(
    outbound: O,
    chat: ChatId,
    msg: MessageId,
    latest_rx: watch::Receiver<String>,
    mut displayed: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(EDIT_INTERVAL).await;
            let latest = latest_rx.borrow().clone();
            if latest == displayed {
                continue;
            }
            match outbound.edit_message(chat, msg, &latest, false).await {
                Ok(()) => displayed = latest,
                Err(e) if e.is_transient() => {},
                Err(e) => warn!(error = %e, "streamed edit failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::DeliveryError;
    use async_trait::async_trait;
    use futures::StreamExt;
    use parley_llm::{ChatResponse, ChunkStream, LlmError, LlmResult};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Typing,
        Send { text: String, html: bool },
        Edit { text: String, html: bool },
    }

    /// Records every outbound call; optionally fails all edits.
    #[derive(Clone, Default)]
    struct MockOutbound {
        events: Arc<Mutex<Vec<Event>>>,
        fail_edits: bool,
    }

    impl MockOutbound {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Outbound for MockOutbound {
        async fn send_typing(&self, _chat: ChatId) -> Result<(), DeliveryError> {
            self.events.lock().unwrap().push(Event::Typing);
            Ok(())
        }

        async fn send_message(
            &self,
            _chat: ChatId,
            text: &str,
            _reply_to: Option<MessageId>,
            html: bool,
        ) -> Result<MessageId, DeliveryError> {
            self.events.lock().unwrap().push(Event::Send {
                text: text.to_string(),
                html,
            });
            Ok(MessageId(1))
        }

        async fn edit_message(
            &self,
            _chat: ChatId,
            _msg: MessageId,
            text: &str,
            html: bool,
        ) -> Result<(), DeliveryError> {
            self.events.lock().unwrap().push(Event::Edit {
                text: text.to_string(),
                html,
            });
            if self.fail_edits {
                Err(DeliveryError::RetryAfter(1))
            } else {
                Ok(())
            }
        }
    }

    /// Chat client with a scripted reply.
    struct ScriptedClient {
        batch: Option<String>,
        chunks: Vec<String>,
        chunk_delay: Duration,
        fail: bool,
    }

    impl ScriptedClient {
        fn batch(reply: &str) -> Self {
            Self {
                batch: Some(reply.to_string()),
                chunks: Vec::new(),
                chunk_delay: Duration::ZERO,
                fail: false,
            }
        }

        fn streaming(chunks: &[&str], chunk_delay: Duration) -> Self {
            Self {
                batch: None,
                chunks: chunks.iter().map(ToString::to_string).collect(),
                chunk_delay,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                batch: None,
                chunks: Vec::new(),
                chunk_delay: Duration::ZERO,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn ask(&self, _prompt: &str) -> LlmResult<ChatResponse> {
            // Yield once so the spawned typing task gets polled before
            // this instantly-resolving reply, as a real network call
            // would allow.
            tokio::task::yield_now().await;
            match (&self.batch, self.fail) {
                (Some(reply), false) => Ok(ChatResponse {
                    message: reply.clone(),
                }),
                _ => Err(LlmError::ApiRequestFailed("scripted failure".to_string())),
            }
        }

        async fn ask_stream(&self, _prompt: &str) -> LlmResult<ChunkStream> {
            if self.fail {
                return Err(LlmError::ApiRequestFailed("scripted failure".to_string()));
            }
            let delay = self.chunk_delay;
            let chunks: Vec<StreamChunk> = self
                .chunks
                .iter()
                .enumerate()
                .map(|(index, message)| StreamChunk {
                    index,
                    message: message.clone(),
                })
                .collect();
            let stream = futures::stream::iter(chunks).then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                Ok::<StreamChunk, LlmError>(chunk)
            });
            Ok(Box::pin(stream))
        }

        async fn reset_conversation(&self) {}
    }

    fn sends(events: &[Event]) -> Vec<&Event> {
        events
            .iter()
            .filter(|e| matches!(e, Event::Send { .. }))
            .collect()
    }

    fn edits(events: &[Event]) -> Vec<&Event> {
        events
            .iter()
            .filter(|e| matches!(e, Event::Edit { .. }))
            .collect()
    }

    fn first_content_index(events: &[Event]) -> usize {
        events
            .iter()
            .position(|e| matches!(e, Event::Send { .. }))
            .expect("no message sent")
    }

    #[tokio::test(start_paused = true)]
    async fn batch_sends_one_formatted_reply() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(ScriptedClient::batch("**hi**"), outbound.clone(), false);

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        let sent = sends(&events);
        assert_eq!(sent.len(), 1);
        assert!(
            matches!(sent[0], Event::Send { text, html: true } if text.contains("<b>hi</b>"))
        );
        assert!(edits(&events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_failure_sends_exact_fallback() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(ScriptedClient::failing(), outbound.clone(), false);

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        let sent = sends(&events);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::Send { text, .. } if text == FALLBACK_REPLY));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_typing_stops_before_reply() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(ScriptedClient::batch("hi"), outbound.clone(), false);

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        let first_send = first_content_index(&events);
        assert!(events[..first_send].contains(&Event::Typing));
        assert!(!events[first_send..].contains(&Event::Typing));
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_creates_one_message_and_finalizes() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(
            ScriptedClient::streaming(&["Hel", "Hello", "Hello!"], Duration::ZERO),
            outbound.clone(),
            true,
        );

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        let sent = sends(&events);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::Send { text, html: false } if text == "Hel"));

        let edit_events = edits(&events);
        assert!(!edit_events.is_empty());
        assert!(edit_events.len() <= 2);
        assert!(
            matches!(edit_events.last().unwrap(), Event::Edit { text, html: true } if text == "Hello!")
        );
        // Formatting only on the last edit.
        for edit in &edit_events[..edit_events.len() - 1] {
            assert!(matches!(edit, Event::Edit { html: false, .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_slow_chunks_edit_in_place() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(
            ScriptedClient::streaming(&["Hel", "Hello", "Hello!"], Duration::from_secs(1)),
            outbound.clone(),
            true,
        );

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        assert_eq!(sends(&events).len(), 1);

        let edit_events = edits(&events);
        // Intermediate plain edits happened while chunks trickled in.
        assert!(edit_events.len() >= 2);
        assert!(
            matches!(edit_events.last().unwrap(), Event::Edit { text, html: true } if text == "Hello!")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_typing_stops_at_first_chunk() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(
            ScriptedClient::streaming(&["Hel", "Hello"], Duration::from_secs(1)),
            outbound.clone(),
            true,
        );

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        let first_send = first_content_index(&events);
        assert!(!events[first_send..].contains(&Event::Typing));
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_open_failure_sends_fallback() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(ScriptedClient::failing(), outbound.clone(), true);

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        let sent = sends(&events);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::Send { text, .. } if text == FALLBACK_REPLY));
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_empty_stream_sends_fallback() {
        let outbound = MockOutbound::default();
        let relay = Relay::new(
            ScriptedClient::streaming(&[], Duration::ZERO),
            outbound.clone(),
            true,
        );

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        let sent = sends(&events);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::Send { text, .. } if text == FALLBACK_REPLY));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_edit_failures_do_not_abort_relay() {
        let outbound = MockOutbound {
            fail_edits: true,
            ..MockOutbound::default()
        };
        let relay = Relay::new(
            ScriptedClient::streaming(&["Hel", "Hello", "Hello!"], Duration::from_secs(1)),
            outbound.clone(),
            true,
        );

        relay.handle(ChatId(1), MessageId(10), "hello").await;

        let events = outbound.events();
        // The message was still created and the final edit attempted.
        assert_eq!(sends(&events).len(), 1);
        assert!(
            matches!(edits(&events).last().unwrap(), Event::Edit { html: true, .. })
        );
    }
}
