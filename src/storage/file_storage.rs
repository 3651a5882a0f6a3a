//! File storage - one JSON document holding the whole rule set.
//!
//! Saves go to a sibling temp file which is synced and then renamed over the
//! target, so a crash leaves either the old or the new document on disk.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::StorageIO;
use crate::error::Result;

/// File-backed storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Path to the rule document
    path: PathBuf,
}

impl FileStorage {
    /// Open storage at the given path, creating the parent directory if needed.
    ///
    /// The file itself is not created until the first save.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling of the target with `.tmp` appended to the full file name.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StorageIO for FileStorage {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, data: &[u8]) -> Result<()> {
        let tmp_path = self.tmp_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        // Atomic rename
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
