//! Plain data shared by every overheard crate: identifiers, channel and
//! submission models, the inline-action codec and redacted operator events.

pub mod actions;
pub mod events;
pub mod models;
