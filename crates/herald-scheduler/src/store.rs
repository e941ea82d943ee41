use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, error, info, instrument, warn};

use herald_core::{ConnectionId, DuePost, Post, PostId, PostStatus, ResultsMap, TargetResult};

use crate::db::{init_db, ts};
use crate::error::{Result, SchedulerError};

/// Result of an atomic batch claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Every id moved `scheduled` → `processing`.
    Claimed,
    /// At least one id was no longer `scheduled`; nothing changed.
    AlreadyClaimed,
}

/// System of record for post lifecycle state.
///
/// `claim_batch` is the single concurrency boundary of the scheduler: it must
/// be all-or-nothing so two ticks (or two processes) can never both own a post.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Posts with status `scheduled` whose `scheduled_at` is at or before `now`.
    ///
    /// A due row that cannot be decoded is moved straight to `failed` with a
    /// `CORRUPT_ROW` result per readable target, so it never blocks later ticks.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<DuePost>>;

    /// Atomically move every id from `scheduled` to `processing`, or none.
    async fn claim_batch(&self, ids: &[PostId]) -> Result<ClaimOutcome>;

    /// Record the terminal status and per-target results of a claimed post.
    async fn finalize(&self, id: &PostId, status: PostStatus, results: &ResultsMap) -> Result<()>;

    /// Posts still in `processing`; after a restart these need manual reconciliation.
    async fn find_in_flight(&self) -> Result<Vec<PostId>>;
}

const POST_COLUMNS: &str = "id, user_id, client_id, content, media, targets, status,
                            scheduled_at, results, created_at, updated_at";

/// SQLite-backed [`PostStore`].
///
/// Wraps a single connection in a `Mutex`; every statement is short and
/// never held across an await point.
pub struct SqlitePostStore {
    db: Mutex<Connection>,
}

impl SqlitePostStore {
    /// Wrap `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a freshly authored post.
    ///
    /// Rejects posts whose future `scheduled_at` contradicts their status.
    #[instrument(skip(self, post), fields(post_id = %post.id))]
    pub fn insert(&self, post: &Post) -> Result<()> {
        if !post.respects_schedule(Utc::now()) {
            return Err(SchedulerError::InvalidPost(format!(
                "post {} is {} but scheduled in the future",
                post.id, post.status
            )));
        }
        let db = self.conn();
        db.execute(
            "INSERT INTO posts
             (id, user_id, client_id, content, media, targets, status,
              scheduled_at, results, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                post.id.as_str(),
                post.user_id,
                post.client_id.as_str(),
                post.content,
                serde_json::to_string(&post.media)?,
                serde_json::to_string(&post.targets)?,
                post.status.as_str(),
                post.scheduled_at.map(ts),
                serde_json::to_string(&post.results)?,
                ts(post.created_at),
                ts(post.updated_at),
            ],
        )?;
        info!(status = %post.status, "post stored");
        Ok(())
    }

    pub fn get(&self, id: &PostId) -> Result<Post> {
        let db = self.conn();
        let row = db
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                [id.as_str()],
                PostRow::read,
            )
            .optional()?;
        match row {
            Some(row) => row.into_post(),
            None => Err(SchedulerError::PostNotFound { id: id.to_string() }),
        }
    }

    /// Delete a post that has not been claimed yet.
    ///
    /// Only legal while `scheduled`; afterwards the scheduler may already have
    /// caused external side effects.
    #[instrument(skip(self), fields(post_id = %id))]
    pub fn cancel(&self, id: &PostId) -> Result<()> {
        let db = self.conn();
        let n = db.execute(
            "DELETE FROM posts WHERE id = ?1 AND status = 'scheduled'",
            [id.as_str()],
        )?;
        if n == 1 {
            info!("scheduled post cancelled");
            return Ok(());
        }
        match current_status(&db, id)? {
            None => Err(SchedulerError::PostNotFound { id: id.to_string() }),
            Some(status) => Err(SchedulerError::NotCancellable {
                id: id.to_string(),
                status,
            }),
        }
    }
}

/// Fail a due row that cannot be decoded. Targets are recovered when their
/// column still parses; otherwise the results map stays empty.
fn fail_corrupt(db: &Connection, id: &str, targets: &str, reason: &str) -> Result<()> {
    let targets: Vec<ConnectionId> = serde_json::from_str(targets).unwrap_or_default();
    let results: ResultsMap = targets
        .into_iter()
        .map(|target| (target, TargetResult::failed("CORRUPT_ROW", reason)))
        .collect();
    let n = db.execute(
        "UPDATE posts SET status = 'failed', results = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'scheduled'",
        rusqlite::params![serde_json::to_string(&results)?, ts(Utc::now()), id],
    )?;
    if n == 1 {
        error!(post_id = %id, code = "CORRUPT_ROW", %reason, "undecodable due post marked failed");
    }
    Ok(())
}

fn current_status(db: &Connection, id: &PostId) -> Result<Option<String>> {
    Ok(db
        .query_row(
            "SELECT status FROM posts WHERE id = ?1",
            [id.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<DuePost>> {
        let db = self.conn();
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?1
             ORDER BY scheduled_at"
        ))?;
        let rows: Vec<PostRow> = stmt
            .query_map([ts(now)], PostRow::read)?
            .collect::<rusqlite::Result<_>>()?;

        drop(stmt);

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            let targets = row.targets.clone();
            match row.into_post() {
                Ok(post) => due.push(post.summary()),
                Err(e) => fail_corrupt(&db, &id, &targets, &e.to_string())?,
            }
        }
        debug!(count = due.len(), "due posts found");
        Ok(due)
    }

    async fn claim_batch(&self, ids: &[PostId]) -> Result<ClaimOutcome> {
        let mut db = self.conn();
        let now = ts(Utc::now());
        let tx = db.transaction()?;
        let mut claimed = 0usize;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE posts SET status = 'processing', updated_at = ?1
                 WHERE id = ?2 AND status = 'scheduled'",
            )?;
            for id in ids {
                claimed += stmt.execute(rusqlite::params![now, id.as_str()])?;
            }
        }

        if claimed == ids.len() {
            tx.commit()?;
            debug!(count = claimed, "batch claimed");
            Ok(ClaimOutcome::Claimed)
        } else {
            tx.rollback()?;
            warn!(
                requested = ids.len(),
                available = claimed,
                "batch claim lost a race; nothing claimed"
            );
            Ok(ClaimOutcome::AlreadyClaimed)
        }
    }

    async fn finalize(&self, id: &PostId, status: PostStatus, results: &ResultsMap) -> Result<()> {
        if !PostStatus::Processing.can_transition_to(status) {
            return Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                from: PostStatus::Processing.to_string(),
                to: status,
            });
        }
        let results_json = serde_json::to_string(results)?;
        let db = self.conn();
        let n = db.execute(
            "UPDATE posts SET status = ?1, results = ?2, updated_at = ?3
             WHERE id = ?4 AND status = 'processing'",
            rusqlite::params![status.as_str(), results_json, ts(Utc::now()), id.as_str()],
        )?;
        if n == 1 {
            return Ok(());
        }
        match current_status(&db, id)? {
            None => Err(SchedulerError::PostNotFound { id: id.to_string() }),
            Some(from) => Err(SchedulerError::InvalidTransition {
                id: id.to_string(),
                from,
                to: status,
            }),
        }
    }

    async fn find_in_flight(&self) -> Result<Vec<PostId>> {
        let db = self.conn();
        let mut stmt =
            db.prepare("SELECT id FROM posts WHERE status = 'processing' ORDER BY updated_at")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids.into_iter().map(PostId::from).collect())
    }
}

/// Raw column values, decoded outside the rusqlite row callback so JSON and
/// timestamp errors surface as [`SchedulerError::CorruptRow`].
struct PostRow {
    id: String,
    user_id: String,
    client_id: String,
    content: String,
    media: String,
    targets: String,
    status: String,
    scheduled_at: Option<String>,
    results: String,
    created_at: String,
    updated_at: String,
}

impl PostRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            client_id: row.get(2)?,
            content: row.get(3)?,
            media: row.get(4)?,
            targets: row.get(5)?,
            status: row.get(6)?,
            scheduled_at: row.get(7)?,
            results: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_post(self) -> Result<Post> {
        let id = self.id;
        let corrupt = |reason: String| SchedulerError::CorruptRow {
            id: id.clone(),
            reason,
        };
        let time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| corrupt(format!("bad timestamp {s:?}: {e}")))
        };

        let status = self
            .status
            .parse::<PostStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let scheduled_at = self.scheduled_at.as_deref().map(time).transpose()?;
        let created_at = time(&self.created_at)?;
        let updated_at = time(&self.updated_at)?;
        let media = serde_json::from_str(&self.media).map_err(|e| corrupt(format!("media: {e}")))?;
        let targets =
            serde_json::from_str(&self.targets).map_err(|e| corrupt(format!("targets: {e}")))?;
        let results =
            serde_json::from_str(&self.results).map_err(|e| corrupt(format!("results: {e}")))?;

        Ok(Post {
            id: PostId::from(id.clone()),
            user_id: self.user_id,
            client_id: self.client_id.into(),
            content: self.content,
            media,
            targets,
            status,
            scheduled_at,
            results,
            created_at,
            updated_at,
        })
    }
}
