//! Durable favorite set.
//!
//! The store is the single piece of mutable shared state in the crate. It
//! answers `get_all` with the complete current set (no incremental deltas)
//! and is mutated only through `add`/`remove`; every mutation is followed
//! by an invalidation publish at the call site so all readers re-derive.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage read failed: {0}")]
    ReadFailed(String),

    #[error("storage write failed: {0}")]
    WriteFailed(String),
}

/// Durable set of favorited item identifiers.
///
/// `add` is idempotent in effect, `remove` of an absent id is a no-op. A
/// failed write leaves the stored set unchanged.
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    async fn get_all(&self) -> Result<HashSet<String>, StorageError>;

    async fn add(&self, id: &str) -> Result<(), StorageError>;

    async fn remove(&self, id: &str) -> Result<(), StorageError>;
}

/// SQLite-backed favorite store.
///
/// One table, one column, no uniqueness constraint at the storage layer:
/// duplicate rows are possible and `get_all` collapses them into a set.
/// `remove` deletes the first matching row only.
pub struct SqliteFavoriteStore {
    conn: Mutex<Connection>,
}

impl SqliteFavoriteStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn =
            Connection::open(path).map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS favourite_images (image_id TEXT NOT NULL)",
            params![],
        )
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FavoriteStore for SqliteFavoriteStore {
    async fn get_all(&self) -> Result<HashSet<String>, StorageError> {
        let conn = self.lock();
        let mut statement = conn
            .prepare("SELECT image_id FROM favourite_images")
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        let rows = statement
            .query_map(params![], |row| row.get::<_, String>(0))
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row.map_err(|e| StorageError::ReadFailed(e.to_string()))?);
        }
        Ok(ids)
    }

    async fn add(&self, id: &str) -> Result<(), StorageError> {
        self.lock()
            .execute(
                "INSERT INTO favourite_images (image_id) VALUES (?1)",
                params![id],
            )
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        debug!(id, "favorite added");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        let deleted = self
            .lock()
            .execute(
                "DELETE FROM favourite_images WHERE rowid IN \
                 (SELECT rowid FROM favourite_images WHERE image_id = ?1 LIMIT 1)",
                params![id],
            )
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        debug!(id, deleted, "favorite removed");
        Ok(())
    }
}
