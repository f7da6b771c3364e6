use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

/// Columns a submissions table must carry before moderation can trust it.
const SUBMISSION_COLUMNS: &[&str] = &[
    "id",
    "chat_id",
    "sender_user_id",
    "content_kind",
    "text",
    "media_ref",
    "status",
    "created_at",
];

const CREATE_SUBMISSIONS: &str = "
    CREATE TABLE submissions (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id         INTEGER NOT NULL,
        sender_user_id  INTEGER NOT NULL,
        content_kind    TEXT NOT NULL,
        text            TEXT,
        media_ref       TEXT,
        status          TEXT NOT NULL,
        created_at      TEXT NOT NULL
    );
";

/// Additive, non-destructive schema setup. Safe to run on every start.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS consents (
            user_id      INTEGER PRIMARY KEY,
            accepted     INTEGER NOT NULL,
            policy_hash  TEXT NOT NULL,
            accepted_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            chat_id             INTEGER PRIMARY KEY,
            handle              TEXT,
            owner_user_id       INTEGER NOT NULL,
            moderation_enabled  INTEGER NOT NULL DEFAULT 1,
            reviewer_mode       TEXT NOT NULL DEFAULT 'owner',
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channels_owner
            ON channels(owner_user_id, chat_id);

        CREATE TABLE IF NOT EXISTS reviewer_allowlist (
            chat_id     INTEGER NOT NULL,
            user_id     INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS deeplinks (
            code        TEXT PRIMARY KEY,
            chat_id     INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );
        ",
    )?;

    // Channels from older databases may predate the moderation settings.
    let channel_additions = [
        ("handle", "ALTER TABLE channels ADD COLUMN handle TEXT"),
        (
            "moderation_enabled",
            "ALTER TABLE channels ADD COLUMN moderation_enabled INTEGER NOT NULL DEFAULT 1",
        ),
        (
            "reviewer_mode",
            "ALTER TABLE channels ADD COLUMN reviewer_mode TEXT NOT NULL DEFAULT 'owner'",
        ),
    ];
    for (column, ddl) in channel_additions {
        if !column_exists(conn, "channels", column)? {
            info!("Adding channels.{}", column);
            conn.execute_batch(ddl)?;
        }
    }

    ensure_submissions(conn)?;

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_submissions_queue
            ON submissions(chat_id, status, id);",
    )?;

    info!("Database migrations complete");
    Ok(())
}

/// A submissions table missing required columns is renamed aside, never
/// dropped; its rows are not carried over.
fn ensure_submissions(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "submissions")? {
        conn.execute_batch(CREATE_SUBMISSIONS)?;
        return Ok(());
    }

    let mut missing = Vec::new();
    for column in SUBMISSION_COLUMNS {
        if !column_exists(conn, "submissions", column)? {
            missing.push(*column);
        }
    }
    if missing.is_empty() {
        return Ok(());
    }

    let legacy = legacy_table_name(conn)?;
    warn!(
        "submissions table lacks columns [{}]; preserving it as {}",
        missing.join(", "),
        legacy
    );
    conn.execute_batch(&format!(
        "ALTER TABLE submissions RENAME TO {};\n{}",
        legacy, CREATE_SUBMISSIONS
    ))?;
    Ok(())
}

fn legacy_table_name(conn: &Connection) -> Result<String> {
    let base = format!("submissions_legacy_{}", chrono::Utc::now().timestamp());
    let mut name = base.clone();
    let mut n = 1;
    while table_exists(conn, &name)? {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    Ok(name)
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|n| n == column))
}
