use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Crawl settings for the enrichment stage.
#[derive(Clone, Debug)]
pub struct EnrichCfg {
    pub detail_url_base: String,
    pub checkpoint_interval: usize, // records per segment file
    pub delay_min_ms: u64,          // polite delay between fetches (inclusive range)
    pub delay_max_ms: u64,
    pub user_agent: String,
    pub referer: String,
    pub timeout: Duration,
}

impl Default for EnrichCfg {
    fn default() -> Self {
        Self {
            detail_url_base: "https://www.10000recipe.com/recipe".to_string(),
            checkpoint_interval: 1000,
            delay_min_ms: 300,
            delay_max_ms: 800,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36"
                .to_string(),
            referer: "https://www.google.com/".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Sampling settings for the refinement stage.
#[derive(Clone, Debug)]
pub struct RefineCfg {
    pub seed: u64,
    pub target_total: usize, // must be even: output is split in two equal halves
    pub popular_ratio: f64,
    pub w_view: f64,
    pub w_recommend: f64,
    pub w_scrap: f64,
}

impl Default for RefineCfg {
    fn default() -> Self {
        Self {
            seed: 42,
            target_total: 100_000,
            popular_ratio: 0.60,
            w_view: 0.6,
            w_recommend: 0.2,
            w_scrap: 0.2,
        }
    }
}

impl RefineCfg {
    pub fn validate(&self) -> Result<()> {
        if self.target_total == 0 || self.target_total % 2 != 0 {
            bail!("target_total must be a positive even number (got {})", self.target_total);
        }
        if !(0.0..=1.0).contains(&self.popular_ratio) {
            bail!("popular_ratio must be within [0, 1] (got {})", self.popular_ratio);
        }
        if self.w_view < 0.0 || self.w_recommend < 0.0 || self.w_scrap < 0.0 {
            bail!("popularity weights must be non-negative");
        }
        Ok(())
    }

    /// Size of the popularity subset before clamping to the available records.
    pub fn n_popular(&self) -> usize {
        (self.target_total as f64 * self.popular_ratio).floor() as usize
    }
}

/// Batch/retry settings for the upload stage.
#[derive(Clone, Debug)]
pub struct UploadCfg {
    pub collection: String,
    pub batch_size: usize,
    pub max_retries: usize, // retries after the first attempt
    pub retry_delay: Duration,
}

impl Default for UploadCfg {
    fn default() -> Self {
        Self {
            collection: "recipes".to_string(),
            batch_size: 500,
            max_retries: 3,
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct EtlOptions {
    pub work_dir: PathBuf,
    pub csv_inputs: Vec<PathBuf>,
    pub normalized_json: PathBuf,     // stage 1 output / stage 2 input
    pub checkpoint_dir: PathBuf,      // stage 2 segments / stage 3 input
    pub output_dir: PathBuf,          // stage 3 partitions
    pub output_files: Vec<PathBuf>,   // stage 4 inputs; empty = the two stage 3 partitions
    pub upload_checkpoint: PathBuf,   // stage 4 offsets
    pub parallelism: Option<usize>,   // Some(N) to set rayon threads, None to use default
    pub progress: bool,
    pub enrich: EnrichCfg,
    pub refine: RefineCfg,
    pub upload: UploadCfg,
}

impl Default for EtlOptions {
    fn default() -> Self {
        Self::rooted_at(PathBuf::from("."))
    }
}

impl EtlOptions {
    fn rooted_at(base: PathBuf) -> Self {
        Self {
            csv_inputs: Vec::new(),
            normalized_json: base.join("all_recipes_for_firestore.json"),
            checkpoint_dir: base.join("crawling_checkpoints"),
            output_dir: base.clone(),
            output_files: Vec::new(),
            upload_checkpoint: base.join("upload_checkpoint.json"),
            work_dir: base,
            parallelism: None,
            progress: true,
            enrich: EnrichCfg::default(),
            refine: RefineCfg::default(),
            upload: UploadCfg::default(),
        }
    }

    /// Re-roots every derived path under `dir`; stage settings are kept.
    pub fn with_work_dir(self, dir: impl AsRef<Path>) -> Self {
        let mut next = Self::rooted_at(dir.as_ref().to_path_buf());
        next.csv_inputs = self.csv_inputs;
        next.output_files = self.output_files;
        next.parallelism = self.parallelism;
        next.progress = self.progress;
        next.enrich = self.enrich;
        next.refine = self.refine;
        next.upload = self.upload;
        next
    }
    pub fn with_csv_inputs<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.csv_inputs = files.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        self
    }
    pub fn with_normalized_json(mut self, path: impl AsRef<Path>) -> Self {
        self.normalized_json = path.as_ref().to_path_buf();
        self
    }
    pub fn with_checkpoint_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.checkpoint_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_output_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.output_files = files.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        self
    }
    pub fn with_upload_checkpoint(mut self, path: impl AsRef<Path>) -> Self {
        self.upload_checkpoint = path.as_ref().to_path_buf();
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_enrich(mut self, cfg: EnrichCfg) -> Self {
        self.enrich = cfg;
        self
    }
    pub fn with_refine(mut self, cfg: RefineCfg) -> Self {
        self.refine = cfg;
        self
    }
    pub fn with_upload(mut self, cfg: UploadCfg) -> Self {
        self.upload = cfg;
        self
    }

    /// The two partition files written by the refiner.
    pub fn partition_paths(&self) -> [PathBuf; 2] {
        [
            self.output_dir.join("final_recipes_part1.json"),
            self.output_dir.join("final_recipes_part2.json"),
        ]
    }

    /// Files the uploader reads: explicit list, or the refiner's partitions.
    pub fn upload_inputs(&self) -> Vec<PathBuf> {
        if self.output_files.is_empty() {
            self.partition_paths().to_vec()
        } else {
            self.output_files.clone()
        }
    }
}
