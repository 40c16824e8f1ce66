use crate::config::{EnrichCfg, EtlOptions, RefineCfg, UploadCfg};
use crate::util::init_tracing_once;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Builder-style entry point for every stage. Stage operations live next to their
/// implementation (`ingest`, `enrich`, `refine`, `upload`) as `impl RecipeETL` blocks.
#[derive(Clone, Debug, Default)]
pub struct RecipeETL {
    pub(crate) opts: EtlOptions,
}

impl RecipeETL {
    pub fn new() -> Self {
        Self { opts: EtlOptions::default() }
    }

    pub fn with_options(opts: EtlOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &EtlOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_work_dir(dir); self }
    pub fn csv_inputs<I, P>(mut self, files: I) -> Self where I: IntoIterator<Item = P>, P: AsRef<Path> { self.opts = self.opts.with_csv_inputs(files); self }
    pub fn normalized_json(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_normalized_json(path); self }
    pub fn checkpoint_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_checkpoint_dir(dir); self }
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_output_dir(dir); self }
    pub fn output_files<I, P>(mut self, files: I) -> Self where I: IntoIterator<Item = P>, P: AsRef<Path> { self.opts = self.opts.with_output_files(files); self }
    pub fn upload_checkpoint(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_upload_checkpoint(path); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn enrich_cfg(mut self, cfg: EnrichCfg) -> Self { self.opts = self.opts.with_enrich(cfg); self }
    pub fn refine_cfg(mut self, cfg: RefineCfg) -> Self { self.opts = self.opts.with_refine(cfg); self }
    pub fn upload_cfg(mut self, cfg: UploadCfg) -> Self { self.opts = self.opts.with_upload(cfg); self }

    // -------- Shared stage setup --------

    /// Tracing + optional global rayon pool. Called at the top of every stage.
    pub(crate) fn prepare(&self) {
        init_tracing_once();
        if let Some(n) = self.opts.parallelism {
            if n > 0 {
                rayon::ThreadPoolBuilder::new().num_threads(n).build_global().ok();
            }
        }
    }

    pub(crate) fn ensure_dir(dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
        Ok(dir.to_path_buf())
    }
}
