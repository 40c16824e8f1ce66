use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^partial_results_(\d+)\.json$").expect("Invalid segment regex")
});

static TRAILING_NUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)(\d+)$").expect("Invalid trailing-number regex")
});

/// One enrichment checkpoint file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub index: u64,
    pub path: PathBuf,
}

pub fn segment_file_name(index: u64) -> String {
    format!("partial_results_{index}.json")
}

fn top_level_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let ent = entry.with_context(|| format!("scan {}", dir.display()))?;
        if ent.file_type().is_file() {
            out.push(ent.path().to_path_buf());
        }
    }
    Ok(out)
}

/// All `partial_results_<N>.json` files under `dir`, ordered by `N`.
/// A missing directory is treated as empty.
pub fn discover_segments(dir: &Path) -> Result<Vec<Segment>> {
    let mut segs = Vec::new();
    for path in top_level_files(dir)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if let Some(caps) = SEGMENT_RE.captures(name) {
            if let Ok(index) = caps[1].parse::<u64>() {
                segs.push(Segment { index, path });
            }
        }
    }
    segs.sort_by_key(|s| s.index);
    Ok(segs)
}

/// Next free segment index: one past the highest existing index.
pub fn next_segment_index(segments: &[Segment]) -> u64 {
    segments.iter().map(|s| s.index).max().map_or(1, |m| m + 1)
}

/// Sort key that orders `part_2.json` before `part_10.json`.
fn natural_key(path: &Path) -> (String, Option<u64>, String) {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
    let stem = path.file_stem().and_then(|n| n.to_str()).unwrap_or("");
    match TRAILING_NUM_RE.captures(stem) {
        Some(caps) => (caps[1].to_string(), caps[2].parse().ok(), name),
        None => (stem.to_string(), None, name),
    }
}

/// Every `*.json` file directly under `dir`, in numeric-aware name order.
pub fn discover_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = top_level_files(dir)?
        .into_iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort_by_cached_key(|p| natural_key(p));
    Ok(files)
}
