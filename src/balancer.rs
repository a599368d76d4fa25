//! Least-connections backend selection

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::registry::Backend;

/// Pick the healthy backend with the fewest open connections.
///
/// Ties break to the first occurrence in the given order, so the choice is
/// deterministic for a fixed candidate list. A manual fold is used instead of
/// `Iterator::min_by_key`, which returns the *last* of several equal minima.
///
/// Returns `None` when the list is empty or no candidate is healthy.
pub fn least_connections(candidates: &[Arc<Backend>]) -> Option<Arc<Backend>> {
    let mut best: Option<(&Arc<Backend>, u32)> = None;

    for backend in candidates.iter().filter(|b| b.is_healthy()) {
        let open = backend.open_connections.load(Ordering::Relaxed);
        match best {
            Some((_, min)) if open >= min => {}
            _ => best = Some((backend, open)),
        }
    }

    best.map(|(backend, _)| backend.clone())
}
