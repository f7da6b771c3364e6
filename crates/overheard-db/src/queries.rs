use crate::models::{ChannelRow, ConsentRow, SubmissionRow, now_timestamp};
use crate::Database;
use anyhow::{Result, bail};
use rusqlite::{Connection, Row};

use overheard_types::models::{
    Channel, ChatId, ConsentRecord, Content, QueuePage, ReviewerMode, Submission,
    SubmissionId, SubmissionStatus, UserId,
};

const CHANNEL_COLUMNS: &str =
    "chat_id, handle, owner_user_id, moderation_enabled, reviewer_mode, created_at";

const SUBMISSION_COLUMNS: &str =
    "id, chat_id, sender_user_id, content_kind, text, media_ref, status, created_at";

impl Database {
    // -- Consents --

    pub fn get_consent(&self, user_id: UserId) -> Result<Option<ConsentRecord>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, accepted, policy_hash, accepted_at FROM consents WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(ConsentRow {
                            user_id: row.get(0)?,
                            accepted: row.get(1)?,
                            policy_hash: row.get(2)?,
                            accepted_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            row.map(ConsentRecord::try_from).transpose()
        })
    }

    /// Overwrites any previous decision; only the latest one is kept.
    pub fn upsert_consent(&self, user_id: UserId, accepted: bool, policy_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO consents (user_id, accepted, policy_hash, accepted_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                     accepted = excluded.accepted,
                     policy_hash = excluded.policy_hash,
                     accepted_at = excluded.accepted_at",
                rusqlite::params![user_id, accepted, policy_hash, now_timestamp()],
            )?;
            Ok(())
        })
    }

    // -- Channels --

    /// Create the channel or refresh its handle and owner. Moderation and
    /// reviewer mode only take their defaults on first creation.
    pub fn upsert_channel(
        &self,
        chat_id: ChatId,
        handle: Option<&str>,
        owner_user_id: UserId,
    ) -> Result<Channel> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (chat_id, handle, owner_user_id, moderation_enabled, reviewer_mode, created_at)
                 VALUES (?1, ?2, ?3, 1, 'owner', ?4)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     handle = excluded.handle,
                     owner_user_id = excluded.owner_user_id",
                rusqlite::params![chat_id, handle, owner_user_id, now_timestamp()],
            )?;
            match query_channel(conn, chat_id)? {
                Some(channel) => Ok(channel),
                None => bail!("channel {} vanished after upsert", chat_id),
            }
        })
    }

    pub fn get_channel(&self, chat_id: ChatId) -> Result<Option<Channel>> {
        self.with_conn(|conn| query_channel(conn, chat_id))
    }

    pub fn channels_by_owner(&self, owner_user_id: UserId) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM channels WHERE owner_user_id = ?1 ORDER BY chat_id",
                CHANNEL_COLUMNS
            ))?;
            let rows = stmt
                .query_map([owner_user_id], channel_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Channel::try_from).collect()
        })
    }

    /// Flip moderation and return the new value, `None` if the channel is unknown.
    pub fn toggle_moderation(&self, chat_id: ChatId) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE channels SET moderation_enabled = 1 - moderation_enabled
                 WHERE chat_id = ?1
                 RETURNING moderation_enabled",
                [chat_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Advance OWNER -> ADMINS -> SELECTED -> OWNER and return the new mode.
    pub fn cycle_reviewer_mode(&self, chat_id: ChatId) -> Result<Option<ReviewerMode>> {
        self.with_conn(|conn| {
            let Some(channel) = query_channel(conn, chat_id)? else {
                return Ok(None);
            };
            let next = channel.reviewer_mode.next();
            conn.execute(
                "UPDATE channels SET reviewer_mode = ?2 WHERE chat_id = ?1",
                rusqlite::params![chat_id, next.as_str()],
            )?;
            Ok(Some(next))
        })
    }

    // -- Reviewer allow-list --

    /// Returns false if the user was already on the list.
    pub fn add_reviewer(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reviewer_allowlist (chat_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![chat_id, user_id, now_timestamp()],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Returns false if the user was not on the list.
    pub fn remove_reviewer(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM reviewer_allowlist WHERE chat_id = ?1 AND user_id = ?2",
                [chat_id, user_id],
            )?;
            Ok(removed == 1)
        })
    }

    pub fn list_reviewers(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM reviewer_allowlist WHERE chat_id = ?1 ORDER BY user_id",
            )?;
            let ids = stmt
                .query_map([chat_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn is_reviewer(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM reviewer_allowlist WHERE chat_id = ?1 AND user_id = ?2",
                    [chat_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Deeplinks --

    /// Cache a derived code. Re-issuing the same code overwrites by code value.
    pub fn put_deeplink(&self, code: &str, chat_id: ChatId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO deeplinks (code, chat_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![code, chat_id, now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn resolve_deeplink(&self, code: &str) -> Result<Option<ChatId>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT chat_id FROM deeplinks WHERE code = ?1",
                [code],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Submissions --

    pub fn insert_submission(
        &self,
        chat_id: ChatId,
        sender_user_id: UserId,
        content: &Content,
        status: SubmissionStatus,
    ) -> Result<Submission> {
        if status == SubmissionStatus::Rejected {
            bail!("submissions are never created rejected");
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO submissions (chat_id, sender_user_id, content_kind, text, media_ref, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    chat_id,
                    sender_user_id,
                    content.kind.as_str(),
                    content.text,
                    content.media_ref,
                    status.as_str(),
                    now_timestamp()
                ],
            )?;
            let id = conn.last_insert_rowid();
            match query_submission(conn, id)? {
                Some(submission) => Ok(submission),
                None => bail!("submission {} vanished after insert", id),
            }
        })
    }

    pub fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        self.with_conn(|conn| query_submission(conn, id))
    }

    /// Compare-and-set PENDING -> `status`. Returns false when the submission
    /// was no longer pending (or does not exist); nothing is written then.
    pub fn decide_submission(&self, id: SubmissionId, status: SubmissionStatus) -> Result<bool> {
        if !status.is_final() {
            bail!("a decision must move a submission out of pending");
        }
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE submissions SET status = ?2 WHERE id = ?1 AND status = 'pending'",
                rusqlite::params![id, status.as_str()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn count_pending(&self, chat_id: ChatId) -> Result<u64> {
        self.with_conn(|conn| count_pending(conn, chat_id))
    }

    /// Pending submissions for a channel, newest first.
    pub fn pending_page(&self, chat_id: ChatId, limit: u64, offset: u64) -> Result<QueuePage> {
        self.with_conn(|conn| {
            let total = count_pending(conn, chat_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM submissions
                 WHERE chat_id = ?1 AND status = 'pending'
                 ORDER BY id DESC
                 LIMIT ?2 OFFSET ?3",
                SUBMISSION_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![chat_id, limit as i64, offset as i64],
                    submission_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let items = rows
                .into_iter()
                .map(Submission::try_from)
                .collect::<Result<Vec<_>>>()?;
            Ok(QueuePage { items, total, offset, limit })
        })
    }
}

fn channel_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        chat_id: row.get(0)?,
        handle: row.get(1)?,
        owner_user_id: row.get(2)?,
        moderation_enabled: row.get(3)?,
        reviewer_mode: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn submission_row(row: &Row<'_>) -> rusqlite::Result<SubmissionRow> {
    Ok(SubmissionRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_user_id: row.get(2)?,
        content_kind: row.get(3)?,
        text: row.get(4)?,
        media_ref: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn query_channel(conn: &Connection, chat_id: ChatId) -> Result<Option<Channel>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM channels WHERE chat_id = ?1", CHANNEL_COLUMNS),
            [chat_id],
            channel_row,
        )
        .optional()?;
    row.map(Channel::try_from).transpose()
}

fn query_submission(conn: &Connection, id: SubmissionId) -> Result<Option<Submission>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM submissions WHERE id = ?1", SUBMISSION_COLUMNS),
            [id],
            submission_row,
        )
        .optional()?;
    row.map(Submission::try_from).transpose()
}

fn count_pending(conn: &Connection, chat_id: ChatId) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM submissions WHERE chat_id = ?1 AND status = 'pending'",
        [chat_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overheard_types::models::ContentKind;

    const CHAT: ChatId = -1001234567890;
    const OWNER: UserId = 100;
    const SENDER: UserId = 200;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn consent_upsert_keeps_latest_decision_only() {
        let db = db();
        assert!(db.get_consent(SENDER).unwrap().is_none());

        db.upsert_consent(SENDER, true, "h1").unwrap();
        db.upsert_consent(SENDER, false, "h2").unwrap();

        let record = db.get_consent(SENDER).unwrap().unwrap();
        assert!(!record.accepted);
        assert_eq!(record.policy_hash, "h2");
        let rows: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM consents", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn rebind_keeps_settings() {
        let db = db();
        let created = db.upsert_channel(CHAT, Some("old_handle"), OWNER).unwrap();
        assert!(created.moderation_enabled);
        assert_eq!(created.reviewer_mode, ReviewerMode::Owner);

        assert_eq!(db.toggle_moderation(CHAT).unwrap(), Some(false));
        assert_eq!(db.cycle_reviewer_mode(CHAT).unwrap(), Some(ReviewerMode::Admins));

        let rebound = db.upsert_channel(CHAT, Some("new_handle"), OWNER).unwrap();
        assert_eq!(rebound.handle.as_deref(), Some("new_handle"));
        assert!(!rebound.moderation_enabled);
        assert_eq!(rebound.reviewer_mode, ReviewerMode::Admins);
        assert_eq!(rebound.created_at, created.created_at);
    }

    #[test]
    fn settings_on_unknown_channel_report_none() {
        let db = db();
        assert_eq!(db.toggle_moderation(CHAT).unwrap(), None);
        assert_eq!(db.cycle_reviewer_mode(CHAT).unwrap(), None);
    }

    #[test]
    fn channels_are_listed_per_owner() {
        let db = db();
        db.upsert_channel(-1002, None, OWNER).unwrap();
        db.upsert_channel(-1003, None, SENDER).unwrap();
        db.upsert_channel(-1001, Some("first_one"), OWNER).unwrap();

        let ids: Vec<ChatId> = db
            .channels_by_owner(OWNER)
            .unwrap()
            .into_iter()
            .map(|c| c.chat_id)
            .collect();
        assert_eq!(ids, vec![-1002, -1001]);
    }

    #[test]
    fn reviewer_allowlist_round() {
        let db = db();
        assert!(db.add_reviewer(CHAT, 5).unwrap());
        assert!(!db.add_reviewer(CHAT, 5).unwrap());
        assert!(db.add_reviewer(CHAT, 3).unwrap());
        assert_eq!(db.list_reviewers(CHAT).unwrap(), vec![3, 5]);
        assert!(db.is_reviewer(CHAT, 5).unwrap());
        assert!(!db.is_reviewer(-1009, 5).unwrap());

        assert!(db.remove_reviewer(CHAT, 5).unwrap());
        assert!(!db.remove_reviewer(CHAT, 5).unwrap());
        assert_eq!(db.list_reviewers(CHAT).unwrap(), vec![3]);
    }

    #[test]
    fn deeplink_lookup() {
        let db = db();
        assert_eq!(db.resolve_deeplink("ABC").unwrap(), None);
        db.put_deeplink("ABC", CHAT).unwrap();
        db.put_deeplink("ABC", CHAT).unwrap();
        assert_eq!(db.resolve_deeplink("ABC").unwrap(), Some(CHAT));
    }

    #[test]
    fn decision_is_compare_and_set() {
        let db = db();
        let content = Content::media(ContentKind::Photo, "photo-1", Some("hi")).unwrap();
        let sub = db
            .insert_submission(CHAT, SENDER, &content, SubmissionStatus::Pending)
            .unwrap();
        assert_eq!(sub.content, content);

        assert!(db.decide_submission(sub.id, SubmissionStatus::Sent).unwrap());
        assert!(!db.decide_submission(sub.id, SubmissionStatus::Rejected).unwrap());
        assert_eq!(
            db.get_submission(sub.id).unwrap().unwrap().status,
            SubmissionStatus::Sent
        );
        assert!(!db.decide_submission(9999, SubmissionStatus::Sent).unwrap());
        assert!(db.decide_submission(sub.id, SubmissionStatus::Pending).is_err());
    }

    #[test]
    fn pending_page_is_newest_first() {
        let db = db();
        let mut ids = Vec::new();
        for i in 0..12 {
            let content = Content::text(&format!("message {}", i)).unwrap();
            ids.push(
                db.insert_submission(CHAT, SENDER, &content, SubmissionStatus::Pending)
                    .unwrap()
                    .id,
            );
        }
        let sent = Content::text("already out").unwrap();
        db.insert_submission(CHAT, SENDER, &sent, SubmissionStatus::Sent)
            .unwrap();
        db.decide_submission(ids[0], SubmissionStatus::Rejected).unwrap();

        let first = db.pending_page(CHAT, 10, 0).unwrap();
        assert_eq!(first.total, 11);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].id, ids[11]);
        assert_eq!(first.next_offset(), Some(10));

        let second = db.pending_page(CHAT, 10, 10).unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, ids[1]);
        assert_eq!(second.next_offset(), None);
        assert_eq!(db.count_pending(CHAT).unwrap(), 11);
    }

    #[test]
    fn reopening_a_file_database_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overheard.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_channel(CHAT, None, OWNER).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_channel(CHAT).unwrap().unwrap().owner_user_id, OWNER);
    }
}
