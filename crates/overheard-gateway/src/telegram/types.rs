//! Subset of the Bot API wire format the relay reads and writes.

use serde::{Deserialize, Serialize};

use overheard_types::actions::Keyboard;
use overheard_types::models::{ContentKind, MemberRole, UserId};

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
}

impl ChatMember {
    pub fn role(&self) -> MemberRole {
        match self.status.as_str() {
            "creator" => MemberRole::Owner,
            "administrator" => MemberRole::Administrator,
            "member" | "restricted" => MemberRole::Member,
            _ => MemberRole::None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Sizes in ascending order; the last one is the largest.
    #[serde(default)]
    pub photo: Option<Vec<FileRef>>,
    #[serde(default)]
    pub video: Option<FileRef>,
    #[serde(default)]
    pub document: Option<FileRef>,
    #[serde(default)]
    pub audio: Option<FileRef>,
    #[serde(default)]
    pub voice: Option<FileRef>,
}

impl Message {
    /// Kind and platform file id of attached media, if any.
    pub fn media(&self) -> Option<(ContentKind, &str)> {
        if let Some(sizes) = &self.photo {
            return sizes
                .last()
                .map(|p| (ContentKind::Photo, p.file_id.as_str()));
        }
        [
            (ContentKind::Video, &self.video),
            (ContentKind::Document, &self.document),
            (ContentKind::Audio, &self.audio),
            (ContentKind::Voice, &self.voice),
        ]
        .into_iter()
        .find_map(|(kind, file)| file.as_ref().map(|f| (kind, f.file_id.as_str())))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// The user whose interaction this is; updates are ordered per sender.
    pub fn sender_id(&self) -> Option<UserId> {
        if let Some(query) = &self.callback_query {
            return Some(query.from.id);
        }
        self.message
            .as_ref()
            .filter(|m| m.chat.is_private())
            .and_then(|m| m.from.as_ref())
            .filter(|u| !u.is_bot)
            .map(|u| u.id)
    }
}

// -- Outgoing --

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl From<&Keyboard> for InlineKeyboardMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        Self {
            inline_keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| InlineKeyboardButton {
                            text: button.label.clone(),
                            callback_data: button.action.to_string(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overheard_types::actions::MenuAction;

    #[test]
    fn parses_photo_message_update() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "chat": {"id": 42, "type": "private"},
                "caption": "hi",
                "photo": [
                    {"file_id": "small", "width": 90, "height": 90},
                    {"file_id": "large", "width": 800, "height": 800}
                ]
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.sender_id(), Some(42));
        let message = update.message.unwrap();
        assert_eq!(message.media(), Some((ContentKind::Photo, "large")));
        assert_eq!(message.caption.as_deref(), Some("hi"));
    }

    #[test]
    fn group_messages_have_no_sender() {
        let raw = r#"{
            "update_id": 11,
            "message": {
                "message_id": 6,
                "from": {"id": 42, "is_bot": false},
                "chat": {"id": -100200, "type": "supergroup"},
                "text": "hello"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.sender_id(), None);
    }

    #[test]
    fn callback_sender_is_the_presser() {
        let raw = r#"{
            "update_id": 12,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 7, "is_bot": false},
                "data": "menu_back"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.sender_id(), Some(7));
    }

    #[test]
    fn member_status_maps_to_role() {
        let role = |s: &str| ChatMember { status: s.into() }.role();
        assert_eq!(role("creator"), MemberRole::Owner);
        assert_eq!(role("administrator"), MemberRole::Administrator);
        assert_eq!(role("restricted"), MemberRole::Member);
        assert_eq!(role("kicked"), MemberRole::None);
    }

    #[test]
    fn keyboard_serialises_callback_payloads() {
        let keyboard = Keyboard::new().button("Open", MenuAction::OpenChannel(-1001));
        let markup = InlineKeyboardMarkup::from(&keyboard);
        assert_eq!(
            serde_json::to_value(&markup).unwrap(),
            serde_json::json!({"inline_keyboard": [[{"text": "Open", "callback_data": "ch_open:-1001"}]]})
        );
    }
}
