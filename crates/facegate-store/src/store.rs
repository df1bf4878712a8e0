use crate::codec;
use chrono::NaiveDateTime;
use facegate_core::{Descriptor, Gallery, Identity, StorageError};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    descriptor BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message TEXT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    resolved INTEGER DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_alerts_resolved ON alerts(resolved);
"#;

/// Format SQLite uses for `CURRENT_TIMESTAMP` (UTC).
const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One row of the access event log.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub timestamp: NaiveDateTime,
}

/// One row of the alert log.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub id: i64,
    pub message: String,
    pub timestamp: NaiveDateTime,
    pub resolved: bool,
}

/// SQLite-backed gallery of identities plus the event and alert logs.
pub struct GalleryStore {
    conn: Connection,
}

impl GalleryStore {
    /// Open or create the store at `path`, creating the schema if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", path.display())))?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(unavailable)?;
        // WAL lets a reader (the daemon) coexist with an enrollment writer.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(unavailable)?;

        let store = Self::with_connection(conn)?;
        tracing::info!(path = %path.display(), journal_mode, "gallery store opened");
        Ok(store)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory().map_err(unavailable)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA_SQL).map_err(unavailable)?;
        Ok(Self { conn })
    }

    pub fn identity_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .map_err(read_failed)?;
        Ok(count as usize)
    }

    /// Most recent events first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, COALESCE(name, ''), COALESCE(description, ''), timestamp
                 FROM events ORDER BY id DESC LIMIT ?1",
            )
            .map_err(read_failed)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get::<_, String>(3)?))
            })
            .map_err(read_failed)?;

        let mut events = Vec::new();
        for row in rows {
            let (id, name, description, timestamp) = row.map_err(read_failed)?;
            events.push(EventRecord {
                id,
                name,
                description,
                timestamp: parse_timestamp(&timestamp)?,
            });
        }
        Ok(events)
    }

    /// Most recent alerts first, optionally only unresolved ones.
    pub fn recent_alerts(&self, limit: usize, unresolved_only: bool) -> Result<Vec<AlertRecord>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, COALESCE(message, ''), timestamp, resolved
                 FROM alerts WHERE (?1 = 0 OR resolved = 0)
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(read_failed)?;
        let rows = stmt
            .query_map(params![unresolved_only, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, String>(2)?, row.get::<_, i64>(3)?))
            })
            .map_err(read_failed)?;

        let mut alerts = Vec::new();
        for row in rows {
            let (id, message, timestamp, resolved) = row.map_err(read_failed)?;
            alerts.push(AlertRecord {
                id,
                message,
                timestamp: parse_timestamp(&timestamp)?,
                resolved: resolved != 0,
            });
        }
        Ok(alerts)
    }
}

impl Gallery for GalleryStore {
    fn add_identity(&mut self, name: &str, descriptor: &Descriptor) -> Result<i64, StorageError> {
        self.conn
            .execute(
                "INSERT INTO identities (name, descriptor) VALUES (?1, ?2)",
                params![name, codec::encode(descriptor)],
            )
            .map_err(write_failed)?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(id, name, dims = descriptor.len(), "identity stored");
        Ok(id)
    }

    fn all_identities(&self) -> Result<Vec<Identity>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, descriptor FROM identities ORDER BY id")
            .map_err(read_failed)?;
        let rows = stmt.query_map([], decode_identity_row).map_err(read_failed)?;

        let mut identities = Vec::new();
        for row in rows {
            let (id, name, blob) = row.map_err(read_failed)?;
            let descriptor = codec::decode(&blob)
                .map_err(|e| StorageError::Corrupt(format!("identity {id} ({name}): {e}")))?;
            identities.push(Identity { id, name, descriptor });
        }
        Ok(identities)
    }

    fn log_event(&mut self, name: &str, description: &str) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO events (name, description) VALUES (?1, ?2)",
                params![name, description],
            )
            .map_err(write_failed)?;
        Ok(())
    }

    fn add_alert(&mut self, message: &str) -> Result<(), StorageError> {
        self.conn
            .execute("INSERT INTO alerts (message) VALUES (?1)", params![message])
            .map_err(write_failed)?;
        Ok(())
    }
}

fn decode_identity_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, StorageError> {
    NaiveDateTime::parse_from_str(raw, SQLITE_TIMESTAMP_FORMAT)
        .map_err(|e| StorageError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn unavailable(e: rusqlite::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn read_failed(e: rusqlite::Error) -> StorageError {
    StorageError::Read(e.to_string())
}

fn write_failed(e: rusqlite::Error) -> StorageError {
    StorageError::Write(e.to_string())
}
