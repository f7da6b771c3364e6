use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use overheard_engine::Engine;
use overheard_types::actions::MenuAction;

use crate::render;
use crate::telegram::BotApi;
use crate::telegram::types::{CallbackQuery, Message, Update};

/// Something that consumes one update at a time.
#[async_trait]
pub trait HandleUpdate: Send + Sync + 'static {
    async fn handle(&self, update: Update);
}

/// Feeds updates to the engine and renders its replies.
///
/// This is the outermost error boundary: an unexpected failure is logged in
/// full and reported to the operator by message only, never with the
/// sender's identity or content.
pub struct UpdateHandler {
    engine: Arc<Engine>,
    api: Arc<BotApi>,
}

impl UpdateHandler {
    pub fn new(engine: Arc<Engine>, api: Arc<BotApi>) -> Self {
        Self { engine, api }
    }

    async fn on_message(&self, message: Message) -> anyhow::Result<()> {
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return Ok(());
        };
        let chat_id = message.chat.id;

        let reply = if let Some(text) = message.text.as_deref() {
            match parse_command(text) {
                Some(("start", arg)) => self.engine.handle_start(user_id, arg).await?,
                Some(_) => {
                    debug!("Ignoring unsupported command");
                    return Ok(());
                }
                None => self.engine.handle_text_input(user_id, text).await?,
            }
        } else if let Some((kind, file_id)) = message.media() {
            self.engine
                .handle_media_input(user_id, kind, file_id, message.caption.as_deref())
                .await?
        } else {
            debug!("Ignoring unsupported message type");
            return Ok(());
        };

        render::to_chat(&self.api, chat_id, reply).await;
        Ok(())
    }

    async fn on_callback(&self, query: CallbackQuery) -> anyhow::Result<()> {
        let user_id = query.from.id;
        let data = query.data.as_deref().unwrap_or_default();

        let reply = match data.parse::<MenuAction>() {
            Ok(MenuAction::Approve(id)) => {
                self.engine.handle_moderation_decision(user_id, id, true).await?
            }
            Ok(MenuAction::Reject(id)) => {
                self.engine.handle_moderation_decision(user_id, id, false).await?
            }
            _ => self.engine.handle_menu_action(user_id, data).await?,
        };

        render::to_callback(&self.api, &query, reply).await;
        Ok(())
    }
}

#[async_trait]
impl HandleUpdate for UpdateHandler {
    async fn handle(&self, update: Update) {
        let result = if let Some(query) = update.callback_query {
            self.on_callback(query).await
        } else if let Some(message) = update.message {
            self.on_message(message).await
        } else {
            Ok(())
        };

        if let Err(e) = result {
            error!("Update {} failed: {:#}", update.update_id, e);
            self.engine.report_internal(&e).await;
        }
    }
}

/// `/start payload` -> `("start", Some("payload"))`. Handles `/start@bot`.
fn parse_command(text: &str) -> Option<(&str, Option<&str>)> {
    let rest = text.trim().strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?;
    let command = command.split('@').next().unwrap_or(command);
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());
    Some((command, arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_payload() {
        assert_eq!(parse_command("/start abc_DEF-123"), Some(("start", Some("abc_DEF-123"))));
        assert_eq!(parse_command("/start@overheard_bot"), Some(("start", None)));
        assert_eq!(parse_command("/help"), Some(("help", None)));
        assert_eq!(parse_command("hello /start"), None);
    }
}
