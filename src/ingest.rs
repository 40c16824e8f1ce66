//! Stage 1: CSV exports -> one normalized JSON array of `Recipe`s.

use crate::pipeline::RecipeETL;
use crate::progress::ProgressScope;
use crate::record::{Recipe, RecipeId};
use crate::util::write_json_atomic;
use ahash::AHashSet;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Raw export row. Every column is optional; the export format drifted across dumps.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    #[serde(rename = "RCP_SNO", alias = "\u{feff}RCP_SNO")]
    rcp_sno: Option<String>,
    #[serde(rename = "RCP_TTL")]
    title: Option<String>,
    #[serde(rename = "CKG_IPDC")]
    summary: Option<String>,
    #[serde(rename = "RCP_IMG_URL")]
    image_url: Option<String>,
    #[serde(rename = "CKG_KND_ACTO_NM")]
    category_kind: Option<String>,
    #[serde(rename = "CKG_MTRL_ACTO_NM")]
    category_material: Option<String>,
    #[serde(rename = "CKG_MTH_ACTO_NM")]
    category_method: Option<String>,
    #[serde(rename = "CKG_STA_ACTO_NM")]
    category_situation: Option<String>,
    #[serde(rename = "CKG_INBUN_NM")]
    servings: Option<String>,
    #[serde(rename = "CKG_DODF_NM")]
    difficulty: Option<String>,
    #[serde(rename = "CKG_TIME_NM")]
    cooking_time: Option<String>,
    #[serde(rename = "INQ_CNT")]
    view_count: Option<String>,
    #[serde(rename = "RCMM_CNT")]
    recommend_count: Option<String>,
    #[serde(rename = "SRAP_CNT")]
    scrap_count: Option<String>,
}

/// Lenient counter parsing: "12", "12.0", "1,234" -> numbers; blanks, junk and negatives -> 0.
pub fn parse_counter(raw: &str) -> u64 {
    let t: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if t.is_empty() {
        return 0;
    }
    if let Ok(n) = t.parse::<i64>() {
        return n.max(0) as u64;
    }
    match t.parse::<f64>() {
        Ok(f) if f.is_finite() && f > 0.0 => f.trunc() as u64,
        _ => 0,
    }
}

fn text(v: Option<String>) -> String {
    v.map(|s| s.trim().to_string()).unwrap_or_default()
}

impl CsvRow {
    fn into_recipe(self) -> Option<Recipe> {
        let id = RecipeId::parse(self.rcp_sno.as_deref().unwrap_or(""));
        if id.is_empty() {
            return None;
        }
        Some(Recipe {
            id,
            title: text(self.title),
            summary: text(self.summary),
            image_url: text(self.image_url),
            category_kind: text(self.category_kind),
            category_material: text(self.category_material),
            category_method: text(self.category_method),
            category_situation: text(self.category_situation),
            servings: text(self.servings),
            difficulty: text(self.difficulty),
            cooking_time: text(self.cooking_time),
            view_count: parse_counter(self.view_count.as_deref().unwrap_or("")),
            recommend_count: parse_counter(self.recommend_count.as_deref().unwrap_or("")),
            scrap_count: parse_counter(self.scrap_count.as_deref().unwrap_or("")),
            ..Recipe::default()
        })
    }
}

/// Summary of one ingest run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub rows_read: usize,
    pub rows_skipped: usize, // malformed rows or rows without an id
    pub duplicates: usize,
    pub written: usize,
    pub output: PathBuf,
}

/// Read CSV exports in order, keeping the first row seen for each id.
/// `pb` advances by one as each file finishes.
pub fn load_csv_recipes(files: &[PathBuf], report: &mut IngestReport, pb: &ProgressScope) -> Result<Vec<Recipe>> {
    let mut seen: AHashSet<RecipeId> = AHashSet::new();
    let mut out: Vec<Recipe> = Vec::new();

    for path in files {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("open csv {}", path.display()))?;
        report.files += 1;

        for (line, rec) in rdr.deserialize::<CsvRow>().enumerate() {
            report.rows_read += 1;
            let row = match rec {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!("{}: skip bad row {}: {}", path.display(), line + 2, err);
                    report.rows_skipped += 1;
                    continue;
                }
            };
            let Some(recipe) = row.into_recipe() else {
                tracing::warn!("{}: skip row {} without RCP_SNO", path.display(), line + 2);
                report.rows_skipped += 1;
                continue;
            };
            if !seen.insert(recipe.id.clone()) {
                report.duplicates += 1;
                continue;
            }
            out.push(recipe);
        }
        tracing::info!("{}: {} unique recipes so far", path.display(), out.len());
        pb.inc(1);
    }
    Ok(out)
}

impl RecipeETL {
    /// Stage 1: normalize the configured CSV exports into `normalized_json`.
    pub fn ingest(&self) -> Result<IngestReport> {
        self.prepare();
        let files = &self.opts.csv_inputs;
        if files.is_empty() {
            bail!("no CSV inputs configured");
        }
        for f in files {
            if !f.exists() {
                bail!("input CSV not found: {}", f.display());
            }
        }

        let mut report = IngestReport { output: self.opts.normalized_json.clone(), ..Default::default() };
        let pb = ProgressScope::count_if(self.opts.progress, "Ingest CSV", files.len() as u64);
        let recipes = load_csv_recipes(files, &mut report, &pb)?;

        write_json_atomic(&self.opts.normalized_json, &recipes, true)?;
        report.written = recipes.len();
        pb.finish(format!("{} recipes", report.written));

        tracing::info!(
            "ingest: {} rows from {} files -> {} recipes ({} duplicates, {} skipped) at {}",
            report.rows_read,
            report.files,
            report.written,
            report.duplicates,
            report.rows_skipped,
            self.opts.normalized_json.display()
        );
        Ok(report)
    }
}
