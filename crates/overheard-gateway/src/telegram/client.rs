use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use overheard_engine::{MessageRef, OutgoingMessage, Platform, PlatformError};
use overheard_types::actions::Keyboard;
use overheard_types::models::{ChannelRef, ChatId, ChatInfo, ContentKind, MemberRole, UserId};

use super::types::{ApiResponse, Chat, ChatMember, InlineKeyboardMarkup, Message, Update, User};

/// Bot API method and the field carrying the payload, per content kind.
pub fn send_method(kind: ContentKind) -> (&'static str, &'static str) {
    match kind {
        ContentKind::Text => ("sendMessage", "text"),
        ContentKind::Photo => ("sendPhoto", "photo"),
        ContentKind::Video => ("sendVideo", "video"),
        ContentKind::Document => ("sendDocument", "document"),
        ContentKind::Audio => ("sendAudio", "audio"),
        ContentKind::Voice => ("sendVoice", "voice"),
    }
}

/// Request body for delivering `message` to `chat_id`.
pub fn send_payload(chat_id: ChatId, message: &OutgoingMessage) -> (&'static str, Value) {
    let content = &message.content;
    let (method, field) = send_method(content.kind);

    let mut body = Map::new();
    body.insert("chat_id".into(), json!(chat_id));
    if content.kind.is_media() {
        body.insert(field.into(), json!(content.media_ref));
        if let Some(caption) = content.text.as_deref().filter(|c| !c.is_empty()) {
            body.insert("caption".into(), json!(caption));
        }
    } else {
        body.insert(field.into(), json!(content.body()));
    }
    if let Some(keyboard) = &message.keyboard {
        body.insert(
            "reply_markup".into(),
            json!(InlineKeyboardMarkup::from(keyboard)),
        );
    }
    (method, Value::Object(body))
}

/// Bot API client. Also the relay's [`Platform`].
///
/// Every call is a single HTTPS request bounded by the client timeout; no
/// call is retried here.
pub struct BotApi {
    client: reqwest::Client,
    /// `<api_url>/bot<token>`; never logged.
    endpoint: String,
    me: User,
}

impl BotApi {
    /// Build the client and fetch the bot's own identity.
    pub async fn connect(api_url: &str, token: &str, http_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let endpoint = format!("{}/bot{}", api_url.trim_end_matches('/'), token);

        let me: User = call(&client, &endpoint, "getMe", &json!({}))
            .await
            .context("getMe failed; check the bot token and API URL")?;
        info!(
            "Connected as @{} ({})",
            me.username.as_deref().unwrap_or("?"),
            me.id
        );

        Ok(Self {
            client,
            endpoint,
            me,
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, PlatformError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        call(&self.client, &self.endpoint, method, params).await
    }

    /// Drop whatever queued up while the bot was offline.
    pub async fn drop_pending_updates(&self) -> Result<(), PlatformError> {
        let _: bool = self
            .call("deleteWebhook", &json!({ "drop_pending_updates": true }))
            .await?;
        Ok(())
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, PlatformError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
        markdown: bool,
    ) -> Result<(), PlatformError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        decorate(&mut body, keyboard, markdown);
        let _: Message = self.call("sendMessage", &body).await?;
        Ok(())
    }

    pub async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
        markdown: bool,
    ) -> Result<(), PlatformError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        decorate(&mut body, keyboard, markdown);
        // Returns the edited Message, or `true` for inline messages.
        let _: Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    pub async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), PlatformError> {
        let mut body = json!({ "callback_query_id": query_id });
        if let Some(text) = text {
            body["text"] = json!(text);
            body["show_alert"] = json!(show_alert);
        }
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

fn decorate(body: &mut Value, keyboard: Option<&Keyboard>, markdown: bool) {
    if let Some(keyboard) = keyboard {
        body["reply_markup"] = json!(InlineKeyboardMarkup::from(keyboard));
    }
    if markdown {
        body["parse_mode"] = json!("MarkdownV2");
    }
}

async fn call<P, R>(
    client: &reqwest::Client,
    endpoint: &str,
    method: &str,
    params: &P,
) -> Result<R, PlatformError>
where
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    debug!("Bot API call {}", method);
    let response = client
        .post(format!("{}/{}", endpoint, method))
        .json(params)
        .send()
        .await
        // The URL embeds the token.
        .map_err(|e| PlatformError::Unreachable(e.without_url().to_string()))?;

    let status = response.status();
    let body: ApiResponse<R> = response
        .json()
        .await
        .map_err(|e| PlatformError::Decode(format!("{} ({}): {}", method, status, e.without_url())))?;

    match (body.ok, body.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(PlatformError::Decode(format!("{}: empty result", method))),
        (false, _) => Err(PlatformError::Rejected(
            body.description.unwrap_or_else(|| status.to_string()),
        )),
    }
}

#[async_trait]
impl Platform for BotApi {
    fn bot_user_id(&self) -> UserId {
        self.me.id
    }

    fn bot_username(&self) -> &str {
        self.me.username.as_deref().unwrap_or_default()
    }

    async fn resolve_chat(&self, reference: &ChannelRef) -> Result<ChatInfo, PlatformError> {
        let chat: Chat = match reference {
            ChannelRef::Handle(handle) => {
                self.call("getChat", &json!({ "chat_id": format!("@{}", handle) }))
                    .await?
            }
            ChannelRef::Id(id) => self.call("getChat", &json!({ "chat_id": id })).await?,
        };
        Ok(ChatInfo {
            chat_id: chat.id,
            handle: chat.username,
        })
    }

    async fn member_role(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MemberRole, PlatformError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        Ok(member.role())
    }

    async fn send(
        &self,
        chat_id: ChatId,
        message: OutgoingMessage,
    ) -> Result<MessageRef, PlatformError> {
        let (method, body) = send_payload(chat_id, &message);
        let sent: Message = self.call(method, &body).await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }
}
