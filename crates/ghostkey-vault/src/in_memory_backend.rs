use ghostkey_core::{GhostkeyError, GhostkeyResult, RecordId, StorageBackend};
use std::collections::HashMap;
use std::sync::Mutex;

/// Non-persistent storage backend. Used by tests and ephemeral sessions.
pub struct InMemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

fn lock_data(
    mutex: &Mutex<HashMap<String, Vec<u8>>>,
) -> GhostkeyResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
    mutex
        .lock()
        .map_err(|e| GhostkeyError::Storage(format!("lock poisoned: {}", e)))
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Raw stored bytes for a record (for inspection in tests).
    pub fn raw(&self, record_id: &RecordId) -> Option<Vec<u8>> {
        lock_data(&self.data)
            .ok()
            .and_then(|d| d.get(record_id.as_str()).cloned())
    }

    pub fn count(&self) -> usize {
        lock_data(&self.data).map(|d| d.len()).unwrap_or(0)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, record_id: &RecordId) -> GhostkeyResult<Option<Vec<u8>>> {
        let data = lock_data(&self.data)?;
        Ok(data.get(record_id.as_str()).cloned())
    }

    fn put(&self, record_id: &RecordId, value: &[u8]) -> GhostkeyResult<()> {
        let mut store = lock_data(&self.data)?;
        store.insert(record_id.as_str().to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, record_id: &RecordId) -> GhostkeyResult<bool> {
        let mut data = lock_data(&self.data)?;
        Ok(data.remove(record_id.as_str()).is_some())
    }

    fn exists(&self, record_id: &RecordId) -> GhostkeyResult<bool> {
        let data = lock_data(&self.data)?;
        Ok(data.contains_key(record_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let backend = InMemoryBackend::new();
        let id = RecordId::new("ghostkey_vault");
        assert!(backend.get(&id).unwrap().is_none());
        assert!(!backend.exists(&id).unwrap());

        backend.put(&id, b"v1").unwrap();
        backend.put(&id, b"v2").unwrap();
        assert_eq!(backend.get(&id).unwrap().unwrap(), b"v2");
        assert_eq!(backend.count(), 1);

        assert!(backend.delete(&id).unwrap());
        assert!(!backend.delete(&id).unwrap());
    }
}
