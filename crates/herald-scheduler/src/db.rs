use rusqlite::Connection;

use crate::error::Result;

/// Initialise the publishing schema in `conn`.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
/// Timestamps are fixed-width RFC 3339 UTC strings, so text comparison
/// orders them chronologically.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS clients (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS connections (
            id            TEXT    NOT NULL PRIMARY KEY,
            client_id     TEXT    NOT NULL REFERENCES clients(id),
            platform      TEXT    NOT NULL,   -- 'facebook' | 'instagram'
            page_id       TEXT,
            business_id   TEXT,
            display_name  TEXT,
            access_token  TEXT    NOT NULL,   -- already usable; encryption lives upstream
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL,
            UNIQUE (client_id, platform, page_id)
        );

        CREATE TABLE IF NOT EXISTS posts (
            id            TEXT NOT NULL PRIMARY KEY,
            user_id       TEXT NOT NULL,
            client_id     TEXT NOT NULL,
            content       TEXT NOT NULL,
            media         TEXT NOT NULL DEFAULT '[]',  -- JSON [MediaRef]
            targets       TEXT NOT NULL DEFAULT '[]',  -- JSON [connection id]
            status        TEXT NOT NULL,
            scheduled_at  TEXT,                        -- NULL means immediate
            results       TEXT NOT NULL DEFAULT '{}',  -- JSON {connection id: TargetResult}
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        -- Due-post polling: WHERE status = 'scheduled' AND scheduled_at <= ?
        CREATE INDEX IF NOT EXISTS idx_posts_due ON posts (status, scheduled_at);
        CREATE INDEX IF NOT EXISTS idx_connections_client ON connections (client_id);
        ",
    )?;
    Ok(())
}

/// Canonical timestamp encoding for every TEXT time column.
pub fn ts(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
