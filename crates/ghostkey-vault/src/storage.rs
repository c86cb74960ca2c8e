use ghostkey_core::{GhostkeyError, GhostkeyResult, RecordId, StorageBackend};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend. Holds opaque record blobs keyed by record id.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> GhostkeyResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| GhostkeyError::Storage(format!("failed to open database: {}", e)))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                record_id TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at TEXT DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| GhostkeyError::Storage(format!("failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> GhostkeyResult<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> GhostkeyResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| GhostkeyError::Storage(format!("lock poisoned: {}", e)))
    }
}

impl StorageBackend for SqliteBackend {
    fn get(&self, record_id: &RecordId) -> GhostkeyResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let result: Result<Vec<u8>, _> = conn.query_row(
            "SELECT value FROM records WHERE record_id = ?1",
            params![record_id.as_str()],
            |row| row.get(0),
        );

        match result {
            Ok(data) => Ok(Some(data)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(GhostkeyError::Storage(format!("query failed: {}", e))),
        }
    }

    fn put(&self, record_id: &RecordId, value: &[u8]) -> GhostkeyResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO records (record_id, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![record_id.as_str(), value],
        )
        .map_err(|e| GhostkeyError::Storage(format!("insert failed: {}", e)))?;
        Ok(())
    }

    fn delete(&self, record_id: &RecordId) -> GhostkeyResult<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "DELETE FROM records WHERE record_id = ?1",
                params![record_id.as_str()],
            )
            .map_err(|e| GhostkeyError::Storage(format!("delete failed: {}", e)))?;
        Ok(rows > 0)
    }

    fn exists(&self, record_id: &RecordId) -> GhostkeyResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE record_id = ?1",
                params![record_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| GhostkeyError::Storage(format!("exists query failed: {}", e)))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> SqliteBackend {
        SqliteBackend::in_memory().unwrap()
    }

    #[test]
    fn test_get_nonexistent() {
        let backend = test_backend();
        assert!(backend.get(&RecordId::new("nonexistent")).unwrap().is_none());
    }

    #[test]
    fn test_put_overwrite() {
        let backend = test_backend();
        let id = RecordId::new("ghostkey_vault");
        backend.put(&id, b"data-1").unwrap();
        backend.put(&id, b"data-2").unwrap();
        assert_eq!(backend.get(&id).unwrap().unwrap(), b"data-2");
    }

    #[test]
    fn test_delete_and_exists() {
        let backend = test_backend();
        let id = RecordId::new("ghostkey_vault");
        assert!(!backend.exists(&id).unwrap());
        backend.put(&id, b"data").unwrap();
        assert!(backend.exists(&id).unwrap());
        assert!(backend.delete(&id).unwrap());
        assert!(!backend.delete(&id).unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!("ghostkey-sqlite-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vault.db");
        let id = RecordId::new("ghostkey_vault");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.put(&id, b"persisted").unwrap();
        }
        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.get(&id).unwrap().unwrap(), b"persisted");
        std::fs::remove_dir_all(&dir).ok();
    }
}
