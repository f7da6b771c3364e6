//! Telegram front end of the relay: long-polls the Bot API, routes each
//! update to its sender's ordered worker, feeds it to the engine and renders
//! the reply.

pub mod dispatcher;
pub mod handler;
pub mod poller;
pub mod render;
pub mod telegram;

pub use dispatcher::Dispatcher;
pub use handler::UpdateHandler;
pub use telegram::BotApi;
