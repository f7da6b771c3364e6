#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use overheard_crypto::deeplink::DeeplinkCodec;
use overheard_crypto::policy::Policy;
use overheard_db::Database;
use overheard_engine::{Engine, MessageRef, OutgoingMessage, Platform, PlatformError, Reply};
use overheard_types::models::{ChannelRef, ChatId, ChatInfo, MemberRole, UserId};

pub const BOT: UserId = 100;
pub const OWNER: UserId = 7101;
pub const SENDER: UserId = 7202;
pub const ADMIN: UserId = 7303;
pub const REVIEWER: UserId = 7404;
pub const STRANGER: UserId = 7505;
pub const OPERATOR: ChatId = 999;

pub const CHANNEL: ChatId = -1001234567890;
pub const HANDLE: &str = "news_room";

pub const SALT: &str = "test-salt";
pub const POLICY: &str = "*Policy*\n\nNothing about you is kept\\.";

/// Scriptable stand-in for the messaging platform that records every send.
#[derive(Default)]
pub struct MockPlatform {
    chats: Mutex<Vec<ChatInfo>>,
    roles: Mutex<HashMap<(ChatId, UserId), MemberRole>>,
    sent: Mutex<Vec<(ChatId, OutgoingMessage)>>,
    fail_channel_sends: AtomicBool,
    channel_send_delay_ms: AtomicU64,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_chat(&self, chat_id: ChatId, handle: Option<&str>) {
        self.chats.lock().unwrap().push(ChatInfo {
            chat_id,
            handle: handle.map(str::to_string),
        });
    }

    pub fn set_role(&self, chat_id: ChatId, user_id: UserId, role: MemberRole) {
        self.roles.lock().unwrap().insert((chat_id, user_id), role);
    }

    pub fn fail_channel_sends(&self, fail: bool) {
        self.fail_channel_sends.store(fail, Ordering::SeqCst);
    }

    pub fn delay_channel_sends(&self, delay: Duration) {
        self.channel_send_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<OutgoingMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == chat_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn all_sent(&self) -> Vec<(ChatId, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Text bodies delivered to `chat_id`.
    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent_to(chat_id)
            .into_iter()
            .map(|m| m.content.text.unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn bot_user_id(&self) -> UserId {
        BOT
    }

    fn bot_username(&self) -> &str {
        "overheard_bot"
    }

    async fn resolve_chat(&self, reference: &ChannelRef) -> Result<ChatInfo, PlatformError> {
        let chats = self.chats.lock().unwrap();
        chats
            .iter()
            .find(|chat| match reference {
                ChannelRef::Id(id) => chat.chat_id == *id,
                ChannelRef::Handle(handle) => chat.handle.as_deref() == Some(handle.as_str()),
            })
            .cloned()
            .ok_or_else(|| PlatformError::Rejected("Bad Request: chat not found".into()))
    }

    async fn member_role(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MemberRole, PlatformError> {
        let known = self.chats.lock().unwrap().iter().any(|c| c.chat_id == chat_id);
        if !known {
            return Err(PlatformError::Rejected("Bad Request: chat not found".into()));
        }
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(&(chat_id, user_id))
            .copied()
            .unwrap_or(MemberRole::None))
    }

    async fn send(
        &self,
        chat_id: ChatId,
        message: OutgoingMessage,
    ) -> Result<MessageRef, PlatformError> {
        let is_channel = chat_id < 0;
        if is_channel {
            let delay = self.channel_send_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_channel_sends.load(Ordering::SeqCst) {
                return Err(PlatformError::Rejected(
                    "Forbidden: bot is not a member of the channel chat".into(),
                ));
            }
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat_id, message));
        Ok(MessageRef {
            chat_id,
            message_id: sent.len() as i64,
        })
    }
}

pub struct Harness {
    pub engine: Engine,
    pub platform: Arc<MockPlatform>,
    pub db: Arc<Database>,
}

impl Harness {
    /// A bot whose channel exists on the platform with the usual roles, but
    /// is not bound yet.
    pub fn new() -> Self {
        let platform = MockPlatform::new();
        platform.add_chat(CHANNEL, Some(HANDLE));
        platform.set_role(CHANNEL, BOT, MemberRole::Administrator);
        platform.set_role(CHANNEL, OWNER, MemberRole::Owner);
        platform.set_role(CHANNEL, ADMIN, MemberRole::Administrator);

        let db = Arc::new(Database::open_in_memory().unwrap());
        let engine = Engine::new(
            db.clone(),
            platform.clone(),
            Policy::from_text(POLICY),
            DeeplinkCodec::new(SALT),
            Some(OPERATOR),
        );
        Self {
            engine,
            platform,
            db,
        }
    }

    pub async fn accept(&self, user_id: UserId) {
        let reply = self.press(user_id, "policy_accept").await;
        assert!(reply.body().unwrap().starts_with("✅"), "{:?}", reply);
    }

    pub async fn press(&self, user_id: UserId, action: &str) -> Reply {
        self.engine.handle_menu_action(user_id, action).await.unwrap()
    }

    pub async fn type_text(&self, user_id: UserId, text: &str) -> Reply {
        self.engine.handle_text_input(user_id, text).await.unwrap()
    }

    /// Owner accepts the policy and binds the channel through the menu.
    pub async fn bound(self) -> Self {
        self.accept(OWNER).await;
        self.press(OWNER, "ctl_bind").await;
        let reply = self.type_text(OWNER, &format!("@{}", HANDLE)).await;
        assert!(reply.body().unwrap().starts_with("✅ Channel bound"), "{:?}", reply);
        self
    }

    /// `user_id` picks the channel by handle and stages `text`.
    pub async fn stage_text(&self, user_id: UserId, text: &str) {
        self.press(user_id, "send_pick_channel").await;
        let reply = self.type_text(user_id, &format!("@{}", HANDLE)).await;
        assert_eq!(reply.body().unwrap().lines().next(), Some("Channel selected."));
        self.type_text(user_id, text).await;
    }

    pub fn pending_ids(&self) -> Vec<i64> {
        self.db
            .pending_page(CHANNEL, 100, 0)
            .unwrap()
            .items
            .into_iter()
            .map(|s| s.id)
            .collect()
    }
}
