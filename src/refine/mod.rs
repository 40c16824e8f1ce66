//! Stage 3: load every enrichment segment, clean records into the published schema,
//! keep only records with pictures, and sample exactly `target_total` of them into two
//! equal partitions.

mod clean;
mod sample;

pub use clean::{
    clean_ingredients_list, clean_ingredients_raw, coerce_step_number, normalize_category_kind,
    refine_record, resequence_steps, Refined, NOISE_TOKENS,
};
pub use sample::{category_counts, category_quotas, popularity_scores, rank_by_score, select, Selection};

use crate::paths::discover_json_files;
use crate::pipeline::RecipeETL;
use crate::progress::ProgressScope;
use crate::record::RefinedRecipe;
use crate::util::{read_json, write_json_atomic};
use anyhow::{bail, Result};
use rayon::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Summary of one refinement run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefineReport {
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub records_loaded: usize,
    pub records_kept: usize,    // passed the image filter
    pub records_dropped: usize, // failed the image filter
    pub steps_renumbered: usize,
    pub selection: Selection,
    pub written: usize,
    pub outputs: Vec<PathBuf>,
    pub top_categories: Vec<(String, usize)>,
}

/// Flatten every JSON array file in `dir`. Undecodable or non-array files are skipped.
pub fn load_documents(dir: &Path, report: &mut RefineReport) -> Result<Vec<Value>> {
    let files = discover_json_files(dir)?;
    if files.is_empty() {
        bail!("no JSON files found in {}", dir.display());
    }
    let mut docs = Vec::new();
    for path in files {
        match read_json::<Value>(&path) {
            Ok(Value::Array(items)) => {
                report.files_loaded += 1;
                docs.extend(items);
            }
            Ok(_) => {
                report.files_skipped += 1;
                tracing::warn!("{}: not a JSON array; skipped", path.display());
            }
            Err(e) => {
                report.files_skipped += 1;
                tracing::warn!("{}: load failed, skipped: {e:#}", path.display());
            }
        }
    }
    Ok(docs)
}

fn top_categories(records: &[RefinedRecipe], n: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = category_counts(records).into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
}

impl RecipeETL {
    /// Stage 3: checkpoint segments -> two equal output partitions.
    pub fn refine(&self) -> Result<RefineReport> {
        self.prepare();
        let cfg = &self.opts.refine;
        cfg.validate()?;

        let mut report = RefineReport::default();
        let docs = load_documents(&self.opts.checkpoint_dir, &mut report)?;
        report.records_loaded = docs.len();
        tracing::info!("loaded {} records from {} files", docs.len(), report.files_loaded);

        let pb = ProgressScope::count_if(self.opts.progress, "Refine", docs.len() as u64);
        let refined: Vec<Refined> = docs
            .par_iter()
            .map(|d| {
                let r = refine_record(d);
                pb.inc(1);
                r
            })
            .collect();
        pb.finish("records cleaned");
        drop(docs);

        report.steps_renumbered = refined.iter().map(|r| r.steps_renumbered).sum();
        let kept: Vec<RefinedRecipe> = refined
            .into_iter()
            .map(|r| r.recipe)
            .filter(RefinedRecipe::has_required_images)
            .collect();
        report.records_kept = kept.len();
        report.records_dropped = report.records_loaded - kept.len();
        tracing::info!(
            "image filter kept {} of {} records",
            report.records_kept,
            report.records_loaded
        );

        let selection = select(&kept, cfg)?;
        let mut slots: Vec<Option<RefinedRecipe>> = kept.into_iter().map(Some).collect();
        let merged: Vec<RefinedRecipe> = selection
            .indices
            .iter()
            .filter_map(|&i| slots[i].take())
            .collect();
        tracing::info!(
            "selected {} popular + {} balanced ({} filler) + {} padded",
            selection.popular,
            selection.balanced,
            selection.balanced_filler,
            selection.padded
        );
        report.selection = selection;

        let half = cfg.target_total / 2;
        let (part1, part2) = merged.split_at(half);
        let outputs = self.opts.partition_paths();
        Self::ensure_dir(&self.opts.output_dir)?;
        write_json_atomic(&outputs[0], part1, true)?;
        write_json_atomic(&outputs[1], part2, true)?;

        report.written = merged.len();
        report.top_categories = top_categories(&merged, 10);
        report.outputs = outputs.to_vec();
        tracing::info!(
            "wrote {} + {} records to {} and {}",
            part1.len(),
            part2.len(),
            outputs[0].display(),
            outputs[1].display()
        );
        tracing::info!("category distribution (top 10): {:?}", report.top_categories);
        Ok(report)
    }
}
