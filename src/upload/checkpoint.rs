use crate::util::{read_json, write_json_atomic};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Shared `{ file name -> committed row offset }` checkpoint.
///
/// Every update re-reads the file under the lock and promotes a temp file, so parallel
/// upload workers never overwrite each other's entries and a crash mid-write leaves the
/// previous checkpoint intact.
pub struct OffsetStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OffsetStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_unlocked(&self) -> Result<BTreeMap<String, usize>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        read_json(&self.path).with_context(|| format!("load upload checkpoint {}", self.path.display()))
    }

    /// Snapshot of all offsets. A missing file is an empty checkpoint.
    pub fn load(&self) -> Result<BTreeMap<String, usize>> {
        let _guard = self.lock.lock();
        self.read_unlocked()
    }

    pub fn get(&self, file_key: &str) -> Result<usize> {
        Ok(self.load()?.get(file_key).copied().unwrap_or(0))
    }

    /// Record `offset` for `file_key`, leaving other entries as they are on disk.
    pub fn set(&self, file_key: &str, offset: usize) -> Result<()> {
        let _guard = self.lock.lock();
        let mut all = self.read_unlocked()?;
        all.insert(file_key.to_string(), offset);
        write_json_atomic(&self.path, &all, true)
    }
}
