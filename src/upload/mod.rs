//! Stage 4: push the refined partitions into a document store in fixed-size batches,
//! resuming each file from its committed offset.

mod checkpoint;
mod firestore;
mod sink;

pub use checkpoint::OffsetStore;
pub use firestore::{to_firestore_fields, to_firestore_value, FirestoreSink, FIRESTORE_ENDPOINT};
pub use sink::{DirectorySink, Document, DocumentSink, SinkError};

use crate::concurrency::map_limited;
use crate::config::UploadCfg;
use crate::pipeline::RecipeETL;
use crate::progress::{set_global_multiprogress, ProgressScope};
use crate::record::RecipeId;
use crate::util::read_json;
use anyhow::{bail, Context, Result};
use indicatif::MultiProgress;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::sleep;

/// Outcome for one input file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileUploadReport {
    pub file: PathBuf,
    pub total: usize,
    pub start_offset: usize,
    pub committed_offset: usize, // what the checkpoint holds after this run
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub documents_committed: usize,
}

impl FileUploadReport {
    pub fn is_complete(&self) -> bool {
        self.committed_offset >= self.total
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub files: Vec<FileUploadReport>,
}

impl UploadReport {
    pub fn batches_failed(&self) -> usize {
        self.files.iter().map(|f| f.batches_failed).sum()
    }
    pub fn documents_committed(&self) -> usize {
        self.files.iter().map(|f| f.documents_committed).sum()
    }
}

/// Checkpoint key for an input file: its base name.
pub fn checkpoint_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Document id: the record's `RCP_SNO`, or `<file name>_<absolute index>` when it has none.
pub fn doc_key(record: &Value, file_key: &str, index: usize) -> String {
    let id = record.get("RCP_SNO").map(RecipeId::from_value).unwrap_or_default();
    if id.is_empty() {
        format!("{file_key}_{index}")
    } else {
        id.to_string()
    }
}

/// Commit `batch`, retrying with a fixed delay. Returns whether it eventually committed.
/// A batch the sink rejects as invalid fails on the first attempt.
pub fn commit_with_retry(sink: &dyn DocumentSink, cfg: &UploadCfg, batch: &[Document], label: &str) -> bool {
    let attempts = cfg.max_retries + 1;
    for attempt in 1..=attempts {
        match sink.commit(&cfg.collection, batch) {
            Ok(()) => return true,
            Err(e @ SinkError::InvalidDocument { .. }) => {
                tracing::error!("{label}: commit rejected, not retrying: {e}");
                return false;
            }
            Err(e) if attempt < attempts => {
                tracing::warn!("{label}: commit failed (attempt {attempt}/{attempts}): {e}; retrying");
                sleep(cfg.retry_delay);
            }
            Err(e) => {
                tracing::error!("{label}: commit failed after {attempts} attempts: {e}");
            }
        }
    }
    false
}

fn upload_file(
    path: &Path,
    sink: &dyn DocumentSink,
    store: &OffsetStore,
    cfg: &UploadCfg,
    progress: bool,
) -> Result<FileUploadReport> {
    let docs: Vec<Value> = read_json(path).with_context(|| format!("load upload input {}", path.display()))?;
    let file_key = checkpoint_key(path);
    let total = docs.len();
    let start = store.get(&file_key)?.min(total);
    let batch_size = cfg.batch_size.max(1);

    let mut report = FileUploadReport {
        file: path.to_path_buf(),
        total,
        start_offset: start,
        committed_offset: start,
        ..Default::default()
    };
    if start >= total {
        tracing::info!("{file_key}: already uploaded ({total} documents)");
        return Ok(report);
    }
    tracing::info!("{file_key}: uploading {} of {total} documents from offset {start}", total - start);

    let pb = ProgressScope::count_if(progress, file_key.clone(), total as u64);
    pb.set_position(start as u64);

    // Batches stay aligned to multiples of batch_size so offsets match a fresh run.
    let mut rest = docs.into_iter().skip(start);
    let mut lo = start;
    let mut frozen = false;
    while lo < total {
        let hi = ((lo / batch_size + 1) * batch_size).min(total);
        let batch: Vec<Document> = rest
            .by_ref()
            .take(hi - lo)
            .enumerate()
            .map(|(k, body)| Document { key: doc_key(&body, &file_key, lo + k), body })
            .collect();

        let label = format!("{file_key} [{lo}..{hi})");
        if commit_with_retry(sink, cfg, &batch, &label) {
            report.batches_committed += 1;
            report.documents_committed += batch.len();
            if !frozen {
                store.set(&file_key, hi)?;
                report.committed_offset = hi;
            }
        } else {
            report.batches_failed += 1;
            // later batches still go out, but the offset must not skip this one
            frozen = true;
        }
        pb.inc((hi - lo) as u64);
        lo = hi;
    }

    if report.batches_failed > 0 {
        pb.finish(format!("{file_key}: {} batch(es) failed", report.batches_failed));
        tracing::warn!(
            "{file_key}: {} batch(es) failed; checkpoint held at {}",
            report.batches_failed,
            report.committed_offset
        );
    } else {
        pb.finish(format!("{file_key}: done"));
        tracing::info!("{file_key}: uploaded through {}", report.committed_offset);
    }
    Ok(report)
}

impl RecipeETL {
    /// Stage 4: upload every input file into `sink`, files in parallel.
    pub fn upload(&self, sink: &dyn DocumentSink) -> Result<UploadReport> {
        self.prepare();
        let cfg = &self.opts.upload;
        if cfg.collection.is_empty() {
            bail!("upload collection name is empty");
        }
        let files = self.opts.upload_inputs();
        for f in &files {
            if !f.is_file() {
                bail!("upload input not found: {}", f.display());
            }
        }

        let store = OffsetStore::new(&self.opts.upload_checkpoint);
        let limit = self
            .opts
            .parallelism
            .filter(|&n| n > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
            .min(files.len());
        if self.opts.progress && limit > 1 {
            set_global_multiprogress(Arc::new(MultiProgress::new()));
        }
        tracing::info!(
            "uploading {} file(s) into '{}' with {} worker(s), checkpoint {}",
            files.len(),
            cfg.collection,
            limit.max(1),
            store.path().display()
        );

        let reports = map_limited(&files, limit, |path| upload_file(path, sink, &store, cfg, self.opts.progress))?;
        let report = UploadReport { files: reports };
        tracing::info!(
            "upload finished: {} documents committed, {} batch(es) failed",
            report.documents_committed(),
            report.batches_failed()
        );
        Ok(report)
    }
}
