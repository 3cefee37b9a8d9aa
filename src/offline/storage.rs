//! SQLite-backed queue of hits awaiting delivery.
//!
//! The store holds a single table keyed by the full hit URL, so a given URL
//! can only ever be stored once. Every operation runs under one connection
//! lock; multi-row deletes run inside a transaction.

use crate::offline::hit::Hit;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Failed resend attempts allowed before a stored hit is discarded.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Storage errors.
#[derive(Debug)]
pub enum StorageError {
    Database(String),
    Io(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "Storage database error: {e}"),
            StorageError::Io(e) => write!(f, "Storage IO error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Persistent offline hit queue.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS stored_offline_hit (
                hit     TEXT PRIMARY KEY NOT NULL,
                date    INTEGER NOT NULL,
                retry   INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_stored_offline_hit_date ON stored_offline_hit(date);
            ",
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stamp `hit` for offline delivery and store it.
    ///
    /// `mh_olt` is the shared offline timestamp of a multi-hit; when absent
    /// the current time is used. Storing a URL that is already present is a
    /// no-op and still reports success.
    pub fn insert(&self, hit: &str, mh_olt: Option<&str>) -> Result<bool, StorageError> {
        let olt = mh_olt.map(str::to_string).unwrap_or_else(olt_now);
        let url = build_hit_to_store(hit, &olt);

        let inserted = self
            .lock()
            .execute(
                "INSERT OR IGNORE INTO stored_offline_hit (hit, date, retry) VALUES (?1, ?2, 0)",
                params![url, Utc::now().timestamp_millis()],
            )
            .map_err(db_err)?;

        if inserted == 0 {
            tracing::debug!(%url, "Hit already stored");
        }
        Ok(true)
    }

    /// All stored hits, oldest first.
    pub fn get(&self) -> Result<Vec<Hit>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT hit, date, retry FROM stored_offline_hit ORDER BY date ASC, rowid ASC")
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_hit).map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM stored_offline_hit", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }

    pub fn exists(&self, url: &str) -> Result<bool, StorageError> {
        let found: Option<i64> = self
            .lock()
            .query_row(
                "SELECT 1 FROM stored_offline_hit WHERE hit = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    /// Delete one hit. Returns whether a record was removed.
    pub fn delete(&self, url: &str) -> Result<bool, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let deleted = tx
            .execute("DELETE FROM stored_offline_hit WHERE hit = ?1", params![url])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(deleted > 0)
    }

    /// Delete hits stored before `date`. Returns the number removed.
    pub fn delete_older_than(&self, date: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let deleted = tx
            .execute(
                "DELETE FROM stored_offline_hit WHERE date < ?1",
                params![date.timestamp_millis()],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(deleted)
    }

    /// Delete every stored hit. Returns the number removed.
    pub fn delete_all(&self) -> Result<usize, StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let deleted = tx
            .execute("DELETE FROM stored_offline_hit", [])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(deleted)
    }

    pub fn set_retry_count(&self, url: &str, retry: u32) -> Result<bool, StorageError> {
        let updated = self
            .lock()
            .execute(
                "UPDATE stored_offline_hit SET retry = ?1 WHERE hit = ?2",
                params![retry, url],
            )
            .map_err(db_err)?;
        Ok(updated > 0)
    }

    pub fn get_retry_count(&self, url: &str) -> Result<Option<u32>, StorageError> {
        self.lock()
            .query_row(
                "SELECT retry FROM stored_offline_hit WHERE hit = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }

    /// Oldest stored hit.
    pub fn first(&self) -> Result<Option<Hit>, StorageError> {
        self.lock()
            .query_row(
                "SELECT hit, date, retry FROM stored_offline_hit ORDER BY date ASC, rowid ASC LIMIT 1",
                [],
                row_to_hit,
            )
            .optional()
            .map_err(db_err)
    }

    /// Newest stored hit.
    pub fn last(&self) -> Result<Option<Hit>, StorageError> {
        self.lock()
            .query_row(
                "SELECT hit, date, retry FROM stored_offline_hit ORDER BY date DESC, rowid DESC LIMIT 1",
                [],
                row_to_hit,
            )
            .optional()
            .map_err(db_err)
    }
}

fn row_to_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Hit> {
    let millis: i64 = row.get(1)?;
    Ok(Hit {
        url: row.get(0)?,
        is_offline: true,
        creation_date: Utc.timestamp_millis_opt(millis).single().unwrap_or_default(),
        retry_count: row.get(2)?,
    })
}

/// Offline timestamp: epoch seconds with millisecond precision.
pub fn olt_now() -> String {
    format!("{:.3}", Utc::now().timestamp_millis() as f64 / 1000.0)
}

/// Rewrite a hit for storage: force `cn=offline` and place a single
/// `olt` right after the first `ts` or `mh` parameter (or at the end when
/// neither is present).
pub fn build_hit_to_store(hit: &str, olt: &str) -> String {
    let mut components: Vec<String> = Vec::new();
    let mut olt_placed = false;

    for component in hit.split('&') {
        let key = component.split('=').next().unwrap_or("");
        match key {
            "olt" => continue,
            "cn" => components.push("cn=offline".to_string()),
            _ => components.push(component.to_string()),
        }
        if !olt_placed && (key == "ts" || key == "mh") {
            components.push(format!("olt={olt}"));
            olt_placed = true;
        }
    }
    if !olt_placed {
        components.push(format!("olt={olt}"));
    }
    components.join("&")
}
