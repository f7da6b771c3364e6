use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform-assigned user identifier.
pub type UserId = i64;

/// Platform-assigned chat identifier. Channels use the `-100…` range.
pub type ChatId = i64;

pub type SubmissionId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown reviewer mode: {0}")]
    ReviewerMode(String),

    #[error("unknown content kind: {0}")]
    ContentKind(String),

    #[error("unknown submission status: {0}")]
    Status(String),

    #[error("not a channel reference: {0}")]
    ChannelRef(String),

    #[error("unknown action: {0}")]
    Action(String),

    #[error("empty content")]
    EmptyContent,

    #[error("{0} content needs a media reference")]
    MissingMedia(ContentKind),
}

// -- Reviewer mode --

/// Who besides the owner may decide on pending submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewerMode {
    #[default]
    Owner,
    Admins,
    Selected,
}

impl ReviewerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admins => "admins",
            Self::Selected => "selected",
        }
    }

    /// OWNER -> ADMINS -> SELECTED -> OWNER.
    pub fn next(self) -> Self {
        match self {
            Self::Owner => Self::Admins,
            Self::Admins => Self::Selected,
            Self::Selected => Self::Owner,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Owner => "owner only",
            Self::Admins => "all admins",
            Self::Selected => "selected reviewers",
        }
    }
}

impl fmt::Display for ReviewerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewerMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admins" => Ok(Self::Admins),
            "selected" => Ok(Self::Selected),
            other => Err(ParseError::ReviewerMode(other.to_string())),
        }
    }
}

// -- Content --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        Self::Text,
        Self::Photo,
        Self::Video,
        Self::Document,
        Self::Audio,
        Self::Voice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
        }
    }

    pub fn is_media(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseError::ContentKind(s.to_string()))
    }
}

/// A unit of user content: a kind tag, optional text (body or caption) and an
/// opaque platform media reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub kind: ContentKind,
    pub text: Option<String>,
    pub media_ref: Option<String>,
}

impl Content {
    /// Plain text content. Whitespace-only input is rejected.
    pub fn text(body: &str) -> Result<Self, ParseError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ParseError::EmptyContent);
        }
        Ok(Self {
            kind: ContentKind::Text,
            text: Some(body.to_string()),
            media_ref: None,
        })
    }

    /// Media content with an optional caption. An empty caption is dropped.
    pub fn media(
        kind: ContentKind,
        media_ref: &str,
        caption: Option<&str>,
    ) -> Result<Self, ParseError> {
        if !kind.is_media() || media_ref.is_empty() {
            return Err(ParseError::MissingMedia(kind));
        }
        let caption = caption
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Ok(Self {
            kind,
            text: caption,
            media_ref: Some(media_ref.to_string()),
        })
    }

    /// Text or caption, empty if none.
    pub fn body(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// First `max_chars` characters of the body, with an ellipsis if cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let body = self.body();
        if body.chars().count() > max_chars {
            let cut: String = body.chars().take(max_chars).collect();
            format!("{}…", cut)
        } else {
            body.to_string()
        }
    }
}

// -- Channels --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub chat_id: ChatId,
    pub handle: Option<String>,
    pub owner_user_id: UserId,
    pub moderation_enabled: bool,
    pub reviewer_mode: ReviewerMode,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    /// `@handle` when the channel has one, the numeric id otherwise.
    pub fn title(&self) -> String {
        match &self.handle {
            Some(handle) => format!("@{}", handle),
            None => self.chat_id.to_string(),
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_user_id == user_id
    }
}

/// What the platform reports when a chat reference is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub chat_id: ChatId,
    pub handle: Option<String>,
}

/// A user's (or the bot's) membership role in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Administrator,
    Member,
    None,
}

impl MemberRole {
    pub fn is_admin_or_owner(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }
}

/// A user-typed channel reference: `@handle` or a `-100…` channel id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    Handle(String),
    Id(ChatId),
}

const MIN_HANDLE_LEN: usize = 5;
const MIN_ID_DIGITS: usize = 5;

impl FromStr for ChannelRef {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseError::ChannelRef(s.to_string());

        if let Some(digits) = s.strip_prefix("-100") {
            if digits.len() >= MIN_ID_DIGITS && digits.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse().map(Self::Id).map_err(|_| err());
            }
            return Err(err());
        }

        let handle = s.strip_prefix('@').unwrap_or(s);
        let valid = handle.len() >= MIN_HANDLE_LEN
            && handle.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
            && !handle.bytes().all(|b| b.is_ascii_digit());
        if valid {
            Ok(Self::Handle(handle.to_string()))
        } else {
            Err(err())
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => write!(f, "@{}", handle),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

// -- Submissions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Sent,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for SubmissionStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseError::Status(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub chat_id: ChatId,
    pub sender_user_id: UserId,
    pub content: Content,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
}

/// One page of the pending queue for a channel, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    pub items: Vec<Submission>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl QueuePage {
    pub fn prev_offset(&self) -> Option<u64> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }

    pub fn next_offset(&self) -> Option<u64> {
        let next = self.offset + self.limit;
        (next < self.total).then_some(next)
    }
}

// -- Consent --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub user_id: UserId,
    pub accepted: bool,
    pub policy_hash: String,
    pub accepted_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// Accepted, and for the policy text currently in force.
    pub fn allows(&self, current_policy_hash: &str) -> bool {
        self.accepted && self.policy_hash == current_policy_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviewer_mode_cycles_in_order() {
        let mut mode = ReviewerMode::default();
        let mut seen = vec![mode];
        for _ in 0..3 {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(
            seen,
            vec![
                ReviewerMode::Owner,
                ReviewerMode::Admins,
                ReviewerMode::Selected,
                ReviewerMode::Owner
            ]
        );
    }

    #[test]
    fn channel_ref_accepts_handles_and_ids() {
        assert_eq!(
            "@my_channel".parse::<ChannelRef>().unwrap(),
            ChannelRef::Handle("my_channel".into())
        );
        assert_eq!(
            " my_channel ".parse::<ChannelRef>().unwrap(),
            ChannelRef::Handle("my_channel".into())
        );
        assert_eq!(
            "-1001234567890".parse::<ChannelRef>().unwrap(),
            ChannelRef::Id(-1001234567890)
        );
    }

    #[test]
    fn channel_ref_rejects_garbage() {
        for input in ["", "@abc", "hello world", "12345678", "-1001234", "-42", "@bad-name"] {
            assert!(input.parse::<ChannelRef>().is_err(), "accepted {:?}", input);
        }
    }

    #[test]
    fn text_content_is_trimmed_and_non_empty() {
        assert_eq!(Content::text("  hi  ").unwrap().text.as_deref(), Some("hi"));
        assert_eq!(Content::text("   "), Err(ParseError::EmptyContent));
    }

    #[test]
    fn media_content_requires_media_kind() {
        let photo = Content::media(ContentKind::Photo, "file-1", Some("")).unwrap();
        assert_eq!(photo.text, None);
        assert!(Content::media(ContentKind::Text, "file-1", None).is_err());
        assert!(Content::media(ContentKind::Voice, "", None).is_err());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let content = Content::text("привет, это довольно длинное сообщение").unwrap();
        let preview = content.preview(6);
        assert_eq!(preview, "привет…");
    }

    #[test]
    fn consent_requires_matching_hash() {
        let record = ConsentRecord {
            user_id: 1,
            accepted: true,
            policy_hash: "abc".into(),
            accepted_at: Utc::now(),
        };
        assert!(record.allows("abc"));
        assert!(!record.allows("def"));
        assert!(!ConsentRecord { accepted: false, ..record }.allows("abc"));
    }

    #[test]
    fn queue_page_cursors() {
        let page = QueuePage { items: vec![], total: 25, offset: 10, limit: 10 };
        assert_eq!(page.prev_offset(), Some(0));
        assert_eq!(page.next_offset(), Some(20));

        let last = QueuePage { offset: 20, ..page.clone() };
        assert_eq!(last.next_offset(), None);

        let first = QueuePage { offset: 0, ..page };
        assert_eq!(first.prev_offset(), None);
    }
}
