//! Telegram Bot API over HTTPS.

pub mod client;
pub mod types;

pub use client::BotApi;
