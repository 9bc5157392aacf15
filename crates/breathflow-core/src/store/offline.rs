//! SQLite-backed offline session store.
//!
//! Writes never fail from the caller's point of view: if the database
//! rejects an insert the record is kept in an in-memory spill list and
//! retried on the next write or sync pass.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Notify;
use uuid::Uuid;

use super::migrations;
use super::record::{NewSession, StoredSession, SyncState};
use crate::error::{StoreError, SyncError};
use crate::sync::{PushResult, RemoteSessionSink, SyncReport, SyncStatus};

const CURSOR_KEY: &str = "synced_up_to";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub batch_size: usize,
    /// Rejections after which a session is marked failed and moves behind
    /// the rest of the queue. It is still retried.
    pub max_attempts: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_attempts: 5,
        }
    }
}

/// Local session log with sync bookkeeping.
///
/// Safe to share behind an `Arc`. The connection lock is never held
/// across an await point.
pub struct OfflineSessionStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    spill: Mutex<Vec<Spilled>>,
    online: AtomicBool,
    syncing: AtomicBool,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
    connectivity: Notify,
    options: StoreOptions,
}

/// A record the database refused, with the instant it was created.
struct Spilled {
    record: StoredSession,
    created_at: DateTime<Utc>,
}

/// Clears the in-progress flag when a sync pass ends, however it ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl OfflineSessionStore {
    /// Open (or create) the store at `path`. Starts online.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_millis(500))?;
        Self::from_connection(conn, Some(path.to_path_buf()), options)
    }

    /// Open `sessions.db` in the data directory.
    pub fn open_default(options: StoreOptions) -> Result<Self, crate::error::CoreError> {
        let dir = crate::storage::data_dir()?;
        Ok(Self::open(dir.join("sessions.db"), options)?)
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None, options)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            spill: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            syncing: AtomicBool::new(false),
            last_sync_at: Mutex::new(None),
            connectivity: Notify::new(),
            options: StoreOptions {
                batch_size: options.batch_size.max(1),
                max_attempts: options.max_attempts.max(1),
            },
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Persist a finished session and return its id.
    ///
    /// Never fails: a record the database refuses is held in memory and
    /// written on a later attempt.
    pub fn save_session(&self, session: NewSession) -> String {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let record = StoredSession::from_new(id.clone(), session);
        self.flush_spill();

        match self.insert(&record, created_at) {
            Ok(()) => {
                tracing::info!(session_id = %id, pattern = %record.pattern_id, "session saved");
            }
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "session write failed, holding in memory");
                lock(&self.spill).push(Spilled { record, created_at });
            }
        }
        id
    }

    fn insert(&self, record: &StoredSession, created_at: DateTime<Utc>) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record).map_err(|e| StoreError::CorruptPayload {
            id: record.id.clone(),
            message: e.to_string(),
        })?;
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO sessions (id, pattern_id, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![record.id, record.pattern_id, payload, stamp(created_at)],
        )?;
        Ok(())
    }

    /// Retry spilled records. Returns how many are still held in memory.
    ///
    /// A flushed record keeps its original creation time, so it syncs ahead
    /// of anything saved while it was held.
    pub fn flush_spill(&self) -> usize {
        let pending: Vec<Spilled> = std::mem::take(&mut *lock(&self.spill));
        if pending.is_empty() {
            return 0;
        }
        let mut still_failing = Vec::new();
        for spilled in pending {
            if let Err(e) = self.insert(&spilled.record, spilled.created_at) {
                tracing::debug!(session_id = %spilled.record.id, error = %e, "spilled session still unwritable");
                still_failing.push(spilled);
            }
        }
        let remaining = still_failing.len();
        let mut spill = lock(&self.spill);
        still_failing.append(&mut spill);
        *spill = still_failing;
        remaining
    }

    /// Number of sessions held only in memory.
    pub fn spilled_count(&self) -> usize {
        lock(&self.spill).len()
    }

    /// Give every failed session a fresh set of attempts, moving it back to
    /// its creation-order place in the queue.
    pub fn requeue_failed(&self) -> Result<usize, StoreError> {
        let ids = self.ids_where_failed()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for id in &ids {
            tx.execute(
                "INSERT INTO sync_log (session_id, outcome, detail, at) VALUES (?1, 'requeued', '', ?2)",
                params![id, now],
            )?;
        }
        tx.commit()?;
        tracing::info!(count = ids.len(), "failed sessions requeued");
        Ok(ids.len())
    }

    // ── Connectivity ─────────────────────────────────────────────────

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Record a connectivity change. Going online wakes a waiting worker.
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::AcqRel);
        if online && !was {
            tracing::info!("connectivity restored");
            self.connectivity.notify_one();
        } else if !online && was {
            tracing::info!("connectivity lost");
        }
    }

    /// Resolves after the next offline to online transition.
    pub async fn connectivity_restored(&self) {
        self.connectivity.notified().await;
    }

    // ── Sync ─────────────────────────────────────────────────────────

    /// Push one batch of pending sessions, oldest first. Sessions over the
    /// rejection limit fill whatever room the batch has left.
    ///
    /// Returns `SyncError::Offline` without touching the remote when
    /// offline. A concurrent call while a pass is running is skipped.
    pub async fn sync_once(&self, remote: &dyn RemoteSessionSink) -> Result<SyncReport, SyncError> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            tracing::debug!("sync pass already running, skipping");
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        };

        self.flush_spill();
        let batch = self.pending_batch()?;
        if batch.is_empty() {
            *lock(&self.last_sync_at) = Some(Utc::now());
            return Ok(SyncReport::default());
        }

        let outcomes = match remote.push_batch(&batch).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::warn!(batch = batch.len(), error = %e, "sync push failed");
                return Err(e);
            }
        };

        let report = self.apply_outcomes(&batch, &outcomes)?;
        self.advance_cursor()?;
        *lock(&self.last_sync_at) = Some(Utc::now());
        tracing::info!(
            attempted = report.attempted,
            synced = report.synced,
            rejected = report.rejected,
            newly_failed = report.newly_failed,
            "sync pass finished"
        );
        Ok(report)
    }

    fn apply_outcomes(
        &self,
        batch: &[StoredSession],
        outcomes: &[crate::sync::PushOutcome],
    ) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport {
            attempted: batch.len(),
            ..SyncReport::default()
        };
        let mut rejected_ids = Vec::new();
        {
            let mut conn = lock(&self.conn);
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            for record in batch {
                let Some(outcome) = outcomes.iter().find(|o| o.session_id == record.id) else {
                    tracing::warn!(session_id = %record.id, "remote gave no result, leaving pending");
                    continue;
                };
                match &outcome.result {
                    PushResult::Accepted => {
                        tx.execute(
                            "INSERT INTO sync_log (session_id, outcome, detail, at) VALUES (?1, 'synced', '', ?2)",
                            params![record.id, now],
                        )?;
                        report.synced += 1;
                    }
                    PushResult::Rejected { reason } => {
                        tx.execute(
                            "INSERT INTO sync_log (session_id, outcome, detail, at) VALUES (?1, 'rejected', ?2, ?3)",
                            params![record.id, reason, now],
                        )?;
                        report.rejected += 1;
                        rejected_ids.push(record.id.clone());
                    }
                }
            }
            tx.commit()?;
        }

        for id in rejected_ids {
            if self.failures_for(&id)? == self.options.max_attempts {
                tracing::warn!(session_id = %id, "session rejected too often, marked failed");
                report.newly_failed += 1;
            }
        }
        Ok(report)
    }

    /// Move the cursor past every synced prefix. It never moves back.
    fn advance_cursor(&self) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        let current = read_cursor(&conn)?;
        let first_unsynced: Option<i64> = conn.query_row(
            "SELECT MIN(seq) FROM session_sync_view WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        let candidate = match first_unsynced {
            Some(seq) => seq - 1,
            None => conn
                .query_row("SELECT COALESCE(MAX(seq), 0) FROM sessions", [], |row| {
                    row.get::<_, i64>(0)
                })?,
        };
        if candidate > current {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![CURSOR_KEY, candidate.to_string()],
            )?;
        }
        Ok(())
    }

    /// Undecodable rows are skipped so one bad record cannot stall the queue.
    fn pending_batch(&self) -> Result<Vec<StoredSession>, StoreError> {
        let conn = lock(&self.conn);
        let cursor = read_cursor(&conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, payload, failures FROM session_sync_view
             WHERE seq > ?1 AND synced = 0
             ORDER BY failures >= ?2, created_at, seq",
        )?;
        let rows = stmt.query_map(params![cursor, self.options.max_attempts], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut batch = Vec::new();
        for row in rows {
            if batch.len() == self.options.batch_size {
                break;
            }
            let (id, payload, failures) = row?;
            match decode(&id, &payload) {
                Ok(record) => batch.push(self.with_state(record, false, failures)),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable session"),
            }
        }
        Ok(batch)
    }

    fn failures_for(&self, id: &str) -> Result<u32, StoreError> {
        let conn = lock(&self.conn);
        let failures: i64 = conn.query_row(
            "SELECT failures FROM session_sync_view WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(failures as u32)
    }

    fn ids_where_failed(&self) -> Result<Vec<String>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id FROM session_sync_view WHERE synced = 0 AND failures >= ?1 ORDER BY seq",
        )?;
        let ids = stmt
            .query_map([self.options.max_attempts], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Projection of the sync state. Never fails; database errors are
    /// logged and counted as zero.
    pub fn sync_status(&self) -> SyncStatus {
        let counts = {
            let conn = lock(&self.conn);
            count_states(&conn, self.options.max_attempts)
        };
        let (pending, failed) = counts.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read sync counts");
            (0, 0)
        });
        SyncStatus {
            is_online: self.is_online(),
            pending_count: pending + self.spilled_count(),
            failed_count: failed,
            in_progress: self.syncing.load(Ordering::Acquire),
            last_sync_at: *lock(&self.last_sync_at),
        }
    }

    pub fn session(&self, id: &str) -> Result<Option<StoredSession>, StoreError> {
        if let Some(spilled) = lock(&self.spill).iter().find(|s| s.record.id == id) {
            return Ok(Some(spilled.record.clone()));
        }
        let conn = lock(&self.conn);
        let row = conn
            .query_row(
                "SELECT id, payload, synced, failures FROM session_sync_view WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, payload, synced, failures)| {
            decode(&id, &payload).map(|record| self.with_state(record, synced, failures))
        })
        .transpose()
    }

    /// All readable sessions, oldest first. Spilled records come last.
    pub fn sessions(&self) -> Result<Vec<StoredSession>, StoreError> {
        let mut out = Vec::new();
        {
            let conn = lock(&self.conn);
            let mut stmt = conn.prepare(
                "SELECT id, payload, synced, failures FROM session_sync_view
                 ORDER BY created_at, seq",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;
            for row in rows {
                let (id, payload, synced, failures) = row?;
                match decode(&id, &payload) {
                    Ok(record) => out.push(self.with_state(record, synced, failures)),
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable session"),
                }
            }
        }
        out.extend(lock(&self.spill).iter().map(|s| s.record.clone()));
        Ok(out)
    }

    fn with_state(&self, mut record: StoredSession, synced: bool, failures: i64) -> StoredSession {
        record.sync_state = if synced {
            SyncState::Synced
        } else if failures >= i64::from(self.options.max_attempts) {
            SyncState::Failed
        } else {
            SyncState::Pending
        };
        record
    }

    #[cfg(test)]
    fn connection(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }
}

fn read_cursor(conn: &Connection) -> Result<i64, StoreError> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", [CURSOR_KEY], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// Pending counts every session the remote has not acknowledged, failed
/// ones included; failed is the subset over the rejection limit.
fn count_states(conn: &Connection, max_attempts: u32) -> Result<(usize, usize), StoreError> {
    let cursor = read_cursor(conn)?;
    let pending: i64 = conn.query_row(
        "SELECT COUNT(*) FROM session_sync_view WHERE seq > ?1 AND synced = 0",
        [cursor],
        |row| row.get(0),
    )?;
    let failed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM session_sync_view WHERE synced = 0 AND failures >= ?1",
        [max_attempts],
        |row| row.get(0),
    )?;
    Ok((pending as usize, failed as usize))
}

/// Fixed-width UTC timestamp; sorts the same as the instant it encodes.
fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode(id: &str, payload: &str) -> Result<StoredSession, StoreError> {
    serde_json::from_str(payload).map_err(|e| StoreError::CorruptPayload {
        id: id.to_string(),
        message: e.to_string(),
    })
}
