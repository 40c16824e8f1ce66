//! Concurrency helper: bound how many upload files are worked on at once.

use anyhow::Result;
use rayon::prelude::*;

/// Map `f` over `items` with at most `limit` calls in flight. Results keep input order.
pub fn map_limited<T, R, F>(items: &[T], limit: usize, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Sync + Fn(&T) -> Result<R>,
{
    let mut out = Vec::with_capacity(items.len());
    if limit <= 1 {
        for item in items {
            out.push(f(item)?);
        }
        return Ok(out);
    }
    for chunk in items.chunks(limit) {
        let part: Vec<R> = chunk.par_iter().map(|item| f(item)).collect::<Result<_>>()?;
        out.extend(part);
    }
    Ok(out)
}
