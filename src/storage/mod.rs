//! Persistence backends for the rule set.
//!
//! The rule store sees storage as an opaque blob: `load()` returns the last
//! saved payload (or nothing) and `save()` replaces it. The blob is the JSON
//! stored view produced by [`encode_stored_view`].
//!
//! - **File**: one JSON file, replaced atomically on every save
//! - **Memory**: in-process buffer for embedding and tests

pub mod file_storage;
pub mod memory;
pub mod types;

pub use file_storage::FileStorage;
pub use memory::MemoryStorage;
pub use types::{
    decode_stored_view, encode_stored_view, DecodedView, SkippedEntry, StoredRule, StoredView,
};

use crate::error::Result;
use std::fmt::Debug;

/// Byte-level persistence backend.
///
/// Implementations must be safe to share between the admin path and the
/// reload task; the rule store never calls `save` from two threads at once.
pub trait StorageIO: Send + Sync + Debug {
    /// Read the stored payload. `Ok(None)` means nothing has been stored yet.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored payload.
    fn save(&self, data: &[u8]) -> Result<()>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}
