use async_trait::async_trait;

use overheard_types::actions::Keyboard;
use overheard_types::models::{
    ChannelRef, ChatId, ChatInfo, Content, ContentKind, MemberRole, UserId,
};

use crate::error::PlatformError;

/// A message to deliver: content of any kind plus optional inline controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Content,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    /// A plain text notice with no controls.
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            content: Content {
                kind: ContentKind::Text,
                text: Some(text.into()),
                media_ref: None,
            },
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Identifies a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// Capabilities the workflow needs from the messaging platform.
///
/// Every call may fail or time out. The engine never retries; failures are
/// surfaced to whoever initiated the action.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own user id, for membership checks on itself.
    fn bot_user_id(&self) -> UserId;

    /// The bot's public username, used to build deeplinks.
    fn bot_username(&self) -> &str;

    /// Resolve a typed reference to a stable chat identity.
    async fn resolve_chat(&self, reference: &ChannelRef) -> Result<ChatInfo, PlatformError>;

    /// Current membership role of `user_id` in `chat_id`, asked live.
    async fn member_role(&self, chat_id: ChatId, user_id: UserId)
    -> Result<MemberRole, PlatformError>;

    /// Deliver a message to a user or a channel.
    async fn send(&self, chat_id: ChatId, message: OutgoingMessage)
    -> Result<MessageRef, PlatformError>;
}
