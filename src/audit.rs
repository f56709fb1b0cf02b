//! Append-only audit log of state transitions, persisted in SQLite.
//!
//! One write connection serialized behind a mutex; SQLite's autoincrement
//! primary key assigns unique, monotonically increasing entry ids. Handlers
//! call these synchronous methods through `tokio::task::spawn_blocking` so a
//! slow disk does not stall unrelated requests.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::state::StateSnapshot;

pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug)]
pub enum AuditError {
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    Poisoned,
}

impl std::fmt::Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "open audit database {}: {source}", path.display())
            }
            Self::Sql(e) => write!(f, "audit query: {e}"),
            Self::Json(e) => write!(f, "audit row encoding: {e}"),
            Self::Poisoned => write!(f, "audit connection lock poisoned"),
        }
    }
}

impl std::error::Error for AuditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Sql(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Poisoned => None,
        }
    }
}

impl From<rusqlite::Error> for AuditError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// One immutable audit record: the full state before and after an update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: String,
    pub old_value: StateSnapshot,
    pub new_value: StateSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Clone)]
pub struct AuditLog {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLog {
    /// Open or create the audit database. Safe to call on every process
    /// start; existing entries are kept.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| AuditError::Open {
            path: path.clone(),
            source,
        })?;

        // WAL keeps list queries from blocking behind an in-flight append.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                old_value TEXT NOT NULL,
                new_value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persist one state transition. The id and UTC timestamp are assigned
    /// here, never by the caller; the row is committed before this returns.
    pub fn append(
        &self,
        old: &StateSnapshot,
        new: &StateSnapshot,
    ) -> Result<LogEntry, AuditError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let old_json = serde_json::to_string(old)?;
        let new_json = serde_json::to_string(new)?;

        let conn = self.conn.lock().map_err(|_| AuditError::Poisoned)?;
        conn.execute(
            "INSERT INTO logs (timestamp, old_value, new_value) VALUES (?1, ?2, ?3)",
            params![timestamp, old_json, new_json],
        )?;
        let id = conn.last_insert_rowid();

        Ok(LogEntry {
            id,
            timestamp,
            old_value: old.clone(),
            new_value: new.clone(),
        })
    }

    /// Paginated listing, most recent first. `page` is 1-indexed; callers
    /// validate the bounds. Timestamp ties break by id descending so the
    /// order is deterministic. A page past the end yields an empty list with
    /// the correct total.
    pub fn list(&self, page: i64, limit: i64) -> Result<LogPage, AuditError> {
        // Saturate so an absurdly large page lands past the end (empty list)
        // instead of wrapping negative, which SQLite reads as offset 0.
        let offset = (page - 1).saturating_mul(limit);

        let conn = self.conn.lock().map_err(|_| AuditError::Poisoned)?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, old_value, new_value FROM logs
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, timestamp, old_json, new_json) = row?;
            logs.push(LogEntry {
                id,
                timestamp,
                old_value: serde_json::from_str(&old_json)?,
                new_value: serde_json::from_str(&new_json)?,
            });
        }

        Ok(LogPage {
            logs,
            page,
            limit,
            total,
        })
    }
}
