//! Two-phase stratified selection: top-K by popularity, then a category-proportional
//! sample of the rest, merged and sized to exactly `target_total`.
//!
//! Everything here works on indices into the filtered record list and only uses
//! order-preserving containers for anything that influences output order, so a
//! fixed seed gives byte-identical partitions.

use crate::config::RefineCfg;
use crate::record::{RecipeId, RefinedRecipe};
use ahash::AHashSet;
use anyhow::{bail, Result};
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering;

/// Per-record popularity relative to the dataset maxima:
/// `w_view·view/max_view + w_recommend·rec/max_rec + w_scrap·scrap/max_scrap`.
pub fn popularity_scores(records: &[RefinedRecipe], cfg: &RefineCfg) -> Vec<f64> {
    let max_view = records.iter().map(|r| r.view_count).max().unwrap_or(0);
    let max_reco = records.iter().map(|r| r.recommend_count).max().unwrap_or(0);
    let max_scrap = records.iter().map(|r| r.scrap_count).max().unwrap_or(0);
    let norm = |v: u64, max: u64| if max == 0 { 0.0 } else { v as f64 / max as f64 };

    records
        .iter()
        .map(|r| {
            cfg.w_view * norm(r.view_count, max_view)
                + cfg.w_recommend * norm(r.recommend_count, max_reco)
                + cfg.w_scrap * norm(r.scrap_count, max_scrap)
        })
        .collect()
}

/// Record counts per `category_kind`, in first-seen order.
pub fn category_counts(records: &[RefinedRecipe]) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for r in records {
        *counts.entry(r.category_kind.clone()).or_insert(0) += 1;
    }
    counts
}

/// Proportional quotas that sum to exactly `n_balanced`.
///
/// Each category gets `floor(count / total · n_balanced)`; the rounding deficit is then
/// handed out one unit at a time to the largest categories (ties keep first-seen order).
pub fn category_quotas(counts: &IndexMap<String, usize>, n_balanced: usize) -> IndexMap<String, usize> {
    let total = counts.values().sum::<usize>().max(1);
    let mut quotas: IndexMap<String, usize> = counts
        .iter()
        .map(|(cat, &cnt)| (cat.clone(), cnt * n_balanced / total))
        .collect();

    let assigned: usize = quotas.values().sum();
    let mut deficit = n_balanced.saturating_sub(assigned);
    if deficit > 0 {
        let mut by_size: Vec<(&String, usize)> = counts.iter().map(|(c, &n)| (c, n)).collect();
        by_size.sort_by(|a, b| b.1.cmp(&a.1));
        // integer division loses < 1 per category, so one pass covers the deficit
        for (cat, _) in by_size {
            if deficit == 0 {
                break;
            }
            if let Some(q) = quotas.get_mut(cat) {
                *q += 1;
                deficit -= 1;
            }
        }
    }
    quotas
}

/// Stable descending sort of record indices by score.
pub fn rank_by_score(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order
}

/// Which records were chosen, in output order, plus how each phase contributed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub indices: Vec<usize>,
    pub popular: usize,
    pub n_balanced: usize,    // balanced-phase target
    pub quota_sum: usize,     // always equals n_balanced
    pub balanced: usize,      // picked from category buckets
    pub balanced_filler: usize, // picked from the pool after buckets ran dry
    pub padded: usize,        // added from the score ranking after the merge
}

/// Run both sampling phases over `records` (already filtered) and size the result.
/// Fails when there are not enough distinct records to reach `target_total`.
pub fn select(records: &[RefinedRecipe], cfg: &RefineCfg) -> Result<Selection> {
    let target = cfg.target_total;
    let scores = popularity_scores(records, cfg);
    let ranked = rank_by_score(&scores);
    let id_of = |i: usize| &records[i].id;

    // Phase 1: popularity
    let n_popular = cfg.n_popular().min(target).min(records.len());
    let popular: Vec<usize> = ranked[..n_popular].to_vec();
    let popular_ids: AHashSet<&RecipeId> = popular.iter().map(|&i| id_of(i)).collect();

    // Phase 2: category balance over the remainder
    let mut pool: Vec<usize> = (0..records.len()).filter(|&i| !popular_ids.contains(id_of(i))).collect();
    let n_balanced = target.saturating_sub(popular.len()).min(pool.len());
    let quotas = category_quotas(&category_counts(records), n_balanced);
    let quota_sum = quotas.values().sum();

    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    pool.shuffle(&mut rng);

    let mut buckets: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for &i in &pool {
        buckets.entry(records[i].category_kind.as_str()).or_default().push(i);
    }

    let mut balanced: Vec<usize> = Vec::with_capacity(n_balanced);
    for (cat, &quota) in &quotas {
        if quota == 0 {
            continue;
        }
        if let Some(bucket) = buckets.get(cat.as_str()) {
            balanced.extend(bucket.iter().take(quota));
        }
    }
    let from_buckets = balanced.len();

    if balanced.len() < n_balanced {
        let need = n_balanced - balanced.len();
        let picked: AHashSet<&RecipeId> = balanced.iter().map(|&i| id_of(i)).collect();
        let filler: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&i| !picked.contains(id_of(i)))
            .take(need)
            .collect();
        balanced.extend(filler);
    }
    let balanced_filler = balanced.len() - from_buckets;

    // Merge, dedupe by id (first wins), then size to target
    let mut seen: AHashSet<&RecipeId> = AHashSet::new();
    let mut merged: Vec<usize> = popular
        .iter()
        .chain(balanced.iter())
        .copied()
        .filter(|&i| seen.insert(id_of(i)))
        .collect();

    // popular + balanced never exceeds target, so sizing only ever pads
    debug_assert!(merged.len() <= target);
    let mut padded = 0;
    if merged.len() < target {
        let need = target - merged.len();
        let extra: Vec<usize> = ranked
            .iter()
            .copied()
            .filter(|&i| seen.insert(id_of(i)))
            .take(need)
            .collect();
        padded = extra.len();
        merged.extend(extra);
    }

    if merged.len() < target {
        bail!(
            "only {} distinct records survive filtering; cannot produce {} (lower target_total)",
            merged.len(),
            target
        );
    }

    Ok(Selection {
        indices: merged,
        popular: popular.len(),
        n_balanced,
        quota_sum,
        balanced: from_buckets,
        balanced_filler,
        padded,
    })
}
