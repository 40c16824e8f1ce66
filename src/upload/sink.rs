//! Document sinks: where committed batches go.

use crate::util::write_json_atomic;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store rejected batch with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid document {key}: {reason}")]
    InvalidDocument { key: String, reason: String },
    #[error("local write failed: {0}")]
    Local(String),
}

/// One document write: `body` stored under `key`.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub key: String,
    pub body: Value,
}

/// A key -> document store that accepts atomic batches of set operations.
pub trait DocumentSink: Send + Sync {
    /// Commit every document in `batch` into `collection`, all or nothing.
    fn commit(&self, collection: &str, batch: &[Document]) -> Result<(), SinkError>;
}

/// Writes each document to `<root>/<collection>/<key>.json`. Used for dry runs and
/// local mirrors of what would be uploaded.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn file_name(key: &str) -> String {
        let safe: String = key
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        format!("{safe}.json")
    }
}

impl DocumentSink for DirectorySink {
    fn commit(&self, collection: &str, batch: &[Document]) -> Result<(), SinkError> {
        let dir = self.root.join(collection);
        for doc in batch {
            if doc.key.is_empty() {
                return Err(SinkError::InvalidDocument { key: doc.key.clone(), reason: "empty key".into() });
            }
            write_json_atomic(&dir.join(Self::file_name(&doc.key)), &doc.body, true)
                .map_err(|e| SinkError::Local(format!("{e:#}")))?;
        }
        Ok(())
    }
}
