//! Durable per-session research records.
//!
//! Records are stored whole as JSON in SQLite. All access runs on tokio's
//! blocking pool through `SqliteStore::call`, so synchronous SQLite I/O never
//! ties up async worker threads.
//!
//! Each session row also carries a lease (`lease_owner`, `lease_expires_ms`).
//! Writers of a session take the lease with a conditional UPDATE before their
//! read-modify-write, which serializes them across engines and processes
//! sharing one database file.

use crate::errors::StoreError;
use crate::research::ResearchRecord;
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long a connection waits on SQLite's file lock before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One row of the session listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub goal: String,
    pub status: String,
    pub iteration_count: u32,
    pub confidence_score: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Durable storage of one research record per session.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create a session with a fresh record at round 0.
    async fn create(
        &self,
        goal: &str,
        decision_context: &str,
    ) -> Result<(i64, ResearchRecord), StoreError>;

    async fn get(&self, id: i64) -> Result<ResearchRecord, StoreError>;

    /// Replace the stored record. The session must exist.
    async fn save(&self, id: i64, record: &ResearchRecord) -> Result<(), StoreError>;

    /// All sessions, newest first.
    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError>;

    /// Take the session's lease for `owner` if it is free or expired.
    ///
    /// Returns `Ok(false)` while another owner holds an unexpired lease.
    async fn try_lease(&self, id: i64, owner: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Drop the lease if `owner` still holds it. No-op otherwise.
    async fn release_lease(&self, id: i64, owner: &str) -> Result<(), StoreError>;
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn status_of(record: &ResearchRecord) -> &'static str {
    if record.is_terminal() {
        "completed"
    } else {
        "active"
    }
}

/// SQLite-backed `StateStore`.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    /// In-memory database, for tests and dry runs.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS research_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                goal TEXT NOT NULL,
                state_json TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                iteration_count INTEGER NOT NULL DEFAULT 0,
                confidence_score REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_research_sessions_status ON research_sessions(status);
            ",
        )?;

        // Additive migrations for databases created before leases existed.
        for (column, ddl) in [
            ("lease_owner", "ALTER TABLE research_sessions ADD COLUMN lease_owner TEXT"),
            (
                "lease_expires_ms",
                "ALTER TABLE research_sessions ADD COLUMN lease_expires_ms INTEGER",
            ),
        ] {
            match conn.execute(ddl, []) {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column") => {}
                Err(e) => {
                    return Err(anyhow::anyhow!("Failed to add {} column: {}", column, e).into());
                }
            }
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on a blocking thread.
    async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("State store task panicked")?
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn create(
        &self,
        goal: &str,
        decision_context: &str,
    ) -> Result<(i64, ResearchRecord), StoreError> {
        let record = ResearchRecord::new(goal).with_decision_context(decision_context);
        let state_json = serde_json::to_string(&record).context("Failed to serialize record")?;
        let goal = goal.to_string();

        let id = self
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO research_sessions (goal, state_json) VALUES (?1, ?2)",
                    params![goal, state_json],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok((id, record))
    }

    async fn get(&self, id: i64) -> Result<ResearchRecord, StoreError> {
        let state_json: Option<String> = self
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state_json FROM research_sessions WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        let state_json = state_json.ok_or(StoreError::NotFound { id })?;
        serde_json::from_str(&state_json).map_err(|source| StoreError::Corrupt { id, source })
    }

    async fn save(&self, id: i64, record: &ResearchRecord) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(record).context("Failed to serialize record")?;
        let status = status_of(record);
        let iteration = record.iteration_count;
        let confidence = record.confidence_score;

        let updated = self
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE research_sessions
                     SET state_json = ?1, status = ?2, iteration_count = ?3,
                         confidence_score = ?4, updated_at = datetime('now')
                     WHERE id = ?5",
                    params![state_json, status, iteration, confidence, id],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, goal, status, iteration_count, confidence_score, created_at, updated_at
                 FROM research_sessions ORDER BY id DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(SessionSummary {
                    id: row.get(0)?,
                    goal: row.get(1)?,
                    status: row.get(2)?,
                    iteration_count: row.get(3)?,
                    confidence_score: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn try_lease(&self, id: i64, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let owner = owner.to_string();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        self.call(move |conn| {
            let now = now_ms();
            let taken = conn.execute(
                "UPDATE research_sessions
                 SET lease_owner = ?2, lease_expires_ms = ?3
                 WHERE id = ?1
                   AND (lease_owner IS NULL OR lease_owner = ?2 OR lease_expires_ms <= ?4)",
                params![id, owner, now.saturating_add(ttl_ms), now],
            )?;
            if taken > 0 {
                return Ok(true);
            }

            let exists = conn
                .query_row(
                    "SELECT 1 FROM research_sessions WHERE id = ?1",
                    params![id],
                    |_| Ok(()),
                )
                .optional()?;
            match exists {
                Some(()) => Ok(false),
                None => Err(StoreError::NotFound { id }),
            }
        })
        .await
    }

    async fn release_lease(&self, id: i64, owner: &str) -> Result<(), StoreError> {
        let owner = owner.to_string();
        self.call(move |conn| {
            conn.execute(
                "UPDATE research_sessions
                 SET lease_owner = NULL, lease_expires_ms = NULL
                 WHERE id = ?1 AND lease_owner = ?2",
                params![id, owner],
            )?;
            Ok(())
        })
        .await
    }
}
