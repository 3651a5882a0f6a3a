//! In-memory storage for embedding and tests.

use parking_lot::RwLock;

use super::StorageIO;
use crate::error::Result;

/// Holds the last saved payload in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<Option<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with a payload.
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: RwLock::new(Some(data.into())),
        }
    }

    /// Replace the payload out-of-band, as another writer of the backend would.
    pub fn replace(&self, data: impl Into<Vec<u8>>) {
        *self.data.write() = Some(data.into());
    }

    /// Drop the payload so the next load finds nothing.
    pub fn clear(&self) {
        *self.data.write() = None;
    }
}

impl StorageIO for MemoryStorage {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().clone())
    }

    fn save(&self, data: &[u8]) -> Result<()> {
        *self.data.write() = Some(data.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
