/// Database row types, mapped directly from SQLite rows.
/// Conversion into overheard-types models happens here so a corrupt row
/// surfaces as an error instead of a silently defaulted value.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

use overheard_types::models::{
    Channel, ConsentRecord, Content, ContentKind, ReviewerMode, Submission, SubmissionStatus,
};

pub struct ConsentRow {
    pub user_id: i64,
    pub accepted: bool,
    pub policy_hash: String,
    pub accepted_at: String,
}

pub struct ChannelRow {
    pub chat_id: i64,
    pub handle: Option<String>,
    pub owner_user_id: i64,
    pub moderation_enabled: bool,
    pub reviewer_mode: String,
    pub created_at: String,
}

pub struct SubmissionRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_user_id: i64,
    pub content_kind: String,
    pub text: Option<String>,
    pub media_ref: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl TryFrom<ConsentRow> for ConsentRecord {
    type Error = anyhow::Error;

    fn try_from(row: ConsentRow) -> Result<Self> {
        Ok(Self {
            user_id: row.user_id,
            accepted: row.accepted,
            policy_hash: row.policy_hash,
            accepted_at: parse_timestamp(&row.accepted_at)?,
        })
    }
}

impl TryFrom<ChannelRow> for Channel {
    type Error = anyhow::Error;

    fn try_from(row: ChannelRow) -> Result<Self> {
        let reviewer_mode: ReviewerMode = row
            .reviewer_mode
            .parse()
            .with_context(|| format!("channel {}", row.chat_id))?;
        Ok(Self {
            chat_id: row.chat_id,
            handle: row.handle,
            owner_user_id: row.owner_user_id,
            moderation_enabled: row.moderation_enabled,
            reviewer_mode,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = anyhow::Error;

    fn try_from(row: SubmissionRow) -> Result<Self> {
        let kind: ContentKind = row
            .content_kind
            .parse()
            .with_context(|| format!("submission {}", row.id))?;
        let status: SubmissionStatus = row
            .status
            .parse()
            .with_context(|| format!("submission {}", row.id))?;
        Ok(Self {
            id: row.id,
            chat_id: row.chat_id,
            sender_user_id: row.sender_user_id,
            content: Content {
                kind,
                text: row.text,
                media_ref: row.media_ref,
            },
            status,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

/// RFC 3339 as written by this crate, or SQLite's `datetime('now')` form.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}
