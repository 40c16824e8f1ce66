//! Progress reporting utilities: count-style progress bars with an optional shared
//! MultiProgress so parallel upload workers each get their own line.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::{Arc, OnceLock};

/// Optional global MultiProgress that allows multiple bars to render concurrently.
/// If unset, progress bars draw to the default terminal target.
static GLOBAL_MP: OnceLock<Arc<MultiProgress>> = OnceLock::new();

/// Install a global MultiProgress used by all subsequently created progress bars.
/// Safe to call once; additional calls are ignored.
pub fn set_global_multiprogress(mp: Arc<MultiProgress>) {
    let _ = GLOBAL_MP.set(mp);
}

fn new_bar(total: u64) -> ProgressBar {
    if let Some(mp) = GLOBAL_MP.get() {
        mp.add(ProgressBar::new(total))
    } else {
        ProgressBar::new(total)
    }
}

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// Count-style progress bar (items processed out of total), with an optional label.
pub fn make_count_progress(total: u64, label: &str) -> ProgressBar {
    let pb = new_bar(total);
    pb.set_style(count_style());
    if !label.is_empty() {
        pb.set_message(label.to_string());
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// A small wrapper around `indicatif` progress bars that can be switched off.
/// - `inc(delta)` increments progress
/// - `set_position(pos)` jumps (used when resuming from a checkpoint)
/// - `finish(msg)` finalizes the bar with a message
pub struct ProgressScope {
    pb: Option<ProgressBar>,
}

impl ProgressScope {
    pub fn count<T: Into<String>>(label: T, total: u64) -> Self {
        let label: String = label.into();
        Self { pb: Some(make_count_progress(total, &label)) }
    }
    pub fn hidden() -> Self {
        Self { pb: None }
    }
    /// `count` when `enabled`, otherwise a no-op scope.
    pub fn count_if<T: Into<String>>(enabled: bool, label: T, total: u64) -> Self {
        if enabled { Self::count(label, total) } else { Self::hidden() }
    }
    #[inline]
    pub fn inc(&self, delta: u64) {
        if let Some(pb) = &self.pb { pb.inc(delta); }
    }
    #[inline]
    pub fn set_position(&self, pos: u64) {
        if let Some(pb) = &self.pb { pb.set_position(pos); }
    }
    /// Current position; 0 for a hidden scope.
    pub fn position(&self) -> u64 {
        self.pb.as_ref().map_or(0, ProgressBar::position)
    }
    pub fn finish<T: Into<String>>(&self, msg: T) {
        if let Some(pb) = &self.pb { pb.finish_with_message(msg.into()); }
    }
}
