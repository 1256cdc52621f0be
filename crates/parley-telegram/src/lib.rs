//! Telegram front end for parley.
//!
//! Forwards user messages to a ChatGPT-style conversational API and
//! relays the reply back, with an allow-list access gate and an
//! optional streaming-response mode that edits the reply in place as
//! chunks arrive.

pub mod allowlist;
pub mod bot;
pub mod config;
pub mod error;
pub mod format;
pub mod handler;
pub mod outbound;
pub mod relay;
pub mod report;
