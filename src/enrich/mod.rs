//! Stage 2: crawl detail pages and fill ingredient/step/image fields, checkpointing
//! progress in numbered segment files so an interrupted run resumes where it stopped.
//!
//! The resume set is derived from the checkpoint directory itself: every id found in
//! any `*.json` file there counts as done, the same file set the refine stage loads.
//! Only `partial_results_<N>.json` names take part in segment numbering, so a
//! hand-placed batch under another name is honored without shifting the index.

mod extract;
mod fetch;

pub use extract::{
    apply_detail, extract_detail, extract_ingredients, extract_main_image, extract_steps,
    segment_ordinal_steps, IngredientDetail, PageDetail, BUY_NOISE, INGREDIENTS_RAW_PREFIX,
};
pub use fetch::{FetchError, HttpFetcher, PageFetcher};

use crate::config::EnrichCfg;
use crate::paths::{discover_json_files, discover_segments, next_segment_index, segment_file_name, Segment};
use crate::pipeline::RecipeETL;
use crate::progress::ProgressScope;
use crate::record::{Recipe, RecipeId};
use crate::util::{read_json, write_json_atomic};
use ahash::AHashSet;
use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

/// Summary of one enrichment run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub total: usize,             // records in the input file
    pub already_processed: usize, // skipped because a checkpoint file already holds them
    pub processed: usize,         // checkpointed this run
    pub fetched: usize,           // network requests issued
    pub enriched: usize,          // fetches that changed the record
    pub failed: usize,            // fetch errors (record kept as-is)
    pub duplicates: usize,        // repeated input ids dropped, first-seen wins
    pub segments_written: usize,
}

#[derive(Deserialize)]
struct IdOnly {
    #[serde(rename = "RCP_SNO", default)]
    id: RecipeId,
}

/// Union of every id stored in any `*.json` file under `dir`, plus the numbered
/// segments found. An unreadable file is fatal: skipping it would silently re-crawl
/// its records.
pub fn load_processed_ids(dir: &Path) -> Result<(AHashSet<RecipeId>, Vec<Segment>)> {
    let segments = discover_segments(dir)?;
    let mut ids = AHashSet::new();
    for path in discover_json_files(dir)? {
        let rows: Vec<IdOnly> =
            read_json(&path).with_context(|| format!("load checkpoint file {}", path.display()))?;
        ids.extend(rows.into_iter().map(|r| r.id));
    }
    Ok((ids, segments))
}

pub fn detail_url(base: &str, id: &RecipeId) -> String {
    format!("{}/{}", base.trim_end_matches('/'), id)
}

fn polite_delay(cfg: &EnrichCfg, rng: &mut impl Rng) -> Duration {
    let lo = cfg.delay_min_ms;
    let hi = cfg.delay_max_ms.max(lo);
    if hi == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.gen_range(lo..=hi))
}

/// Fetch and merge one record. Failures are logged and leave the record untouched.
fn enrich_one(recipe: &mut Recipe, cfg: &EnrichCfg, fetcher: &dyn PageFetcher, report: &mut EnrichReport) {
    let url = detail_url(&cfg.detail_url_base, &recipe.id);
    report.fetched += 1;
    match fetcher.fetch_page(&url) {
        Ok(html) => {
            if apply_detail(recipe, extract_detail(&html)) {
                report.enriched += 1;
            } else {
                tracing::debug!("{url}: no recognizable detail markup");
            }
        }
        Err(e) => {
            report.failed += 1;
            tracing::warn!("{e}");
        }
    }
}

fn write_segment(dir: &Path, index: u64, batch: &[Recipe]) -> Result<()> {
    let path = dir.join(segment_file_name(index));
    write_json_atomic(&path, batch, true)
        .with_context(|| format!("write checkpoint segment {}", path.display()))?;
    tracing::info!("checkpoint saved: {} ({} records)", path.display(), batch.len());
    Ok(())
}

impl RecipeETL {
    /// Stage 2 against the live site.
    pub fn enrich(&self) -> Result<EnrichReport> {
        let fetcher = HttpFetcher::new(&self.opts.enrich)?;
        self.enrich_with(&fetcher)
    }

    /// Stage 2 with a caller-supplied fetcher.
    pub fn enrich_with(&self, fetcher: &dyn PageFetcher) -> Result<EnrichReport> {
        self.prepare();
        let cfg = &self.opts.enrich;
        let input = &self.opts.normalized_json;
        if !input.exists() {
            bail!("input JSON not found: {} (run the ingest stage first)", input.display());
        }
        let interval = cfg.checkpoint_interval.max(1);
        let dir = Self::ensure_dir(&self.opts.checkpoint_dir)?;

        let (processed_ids, segments) = load_processed_ids(&dir)?;
        if !processed_ids.is_empty() {
            tracing::info!(
                "{} recipes already checkpointed in {} segments; resuming",
                processed_ids.len(),
                segments.len()
            );
        }

        let all: Vec<Recipe> = read_json(input)?;
        let mut report = EnrichReport { total: all.len(), ..Default::default() };
        let mut seen = processed_ids.clone();
        let pending: Vec<Recipe> = all
            .into_iter()
            .filter(|r| {
                if processed_ids.contains(&r.id) {
                    report.already_processed += 1;
                    false
                } else if r.id.is_empty() {
                    false
                } else if !seen.insert(r.id.clone()) {
                    report.duplicates += 1;
                    false
                } else {
                    true
                }
            })
            .collect();
        if report.duplicates > 0 {
            tracing::warn!("{} duplicate ids in {}; keeping first occurrence", report.duplicates, input.display());
        }

        if pending.is_empty() {
            tracing::info!("all recipes already enriched; nothing to do");
            return Ok(report);
        }
        tracing::info!("crawling {} of {} recipes", pending.len(), report.total);

        let pb = ProgressScope::count_if(self.opts.progress, "Enrich", pending.len() as u64);
        let mut rng = rand::thread_rng();
        let mut next_index = next_segment_index(&segments);
        let mut batch: Vec<Recipe> = Vec::with_capacity(interval);
        let mut fetched_any = false;

        for mut recipe in pending {
            if !recipe.is_enriched() {
                if fetched_any {
                    sleep(polite_delay(cfg, &mut rng));
                }
                fetched_any = true;
                enrich_one(&mut recipe, cfg, fetcher, &mut report);
            }
            batch.push(recipe);
            report.processed += 1;
            pb.inc(1);

            if batch.len() >= interval {
                write_segment(&dir, next_index, &batch)?;
                next_index += 1;
                report.segments_written += 1;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            write_segment(&dir, next_index, &batch)?;
            report.segments_written += 1;
        }

        pb.finish("enrich done");
        tracing::info!(
            "enrich: {} processed, {} fetched, {} enriched, {} failed, {} segments",
            report.processed,
            report.fetched,
            report.enriched,
            report.failed,
            report.segments_written
        );
        Ok(report)
    }
}
