//! Per-block metrics derived after a run halts.

use std::collections::BTreeMap;

use crate::{model::BlockMetrics, process::BlockCounters};

/// Rounds to 4 decimal places.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Busy time over duration, clamped to `[0, 1]` and rounded. Zero duration gives 0.
pub fn utilization(busy_time_ms: f64, duration_ms: f64) -> f64 {
    if duration_ms > 0.0 {
        round4((busy_time_ms / duration_ms).clamp(0.0, 1.0))
    } else {
        0.0
    }
}

/// Final state of one block, as observed at halt.
#[derive(Debug, Clone, Copy)]
pub struct BlockSnapshot<'a> {
    /// Block id.
    pub block_id: &'a str,
    /// Work counters.
    pub counters: &'a BlockCounters,
    /// Items left in the input queue.
    pub queue_depth: usize,
}

/// Builds the metrics map from per-block snapshots.
pub fn aggregate<'a>(
    snapshots: impl IntoIterator<Item = BlockSnapshot<'a>>,
    duration_ms: f64,
) -> BTreeMap<String, BlockMetrics> {
    snapshots
        .into_iter()
        .map(|snap| {
            (
                snap.block_id.to_string(),
                BlockMetrics {
                    utilization: utilization(snap.counters.busy_time_ms, duration_ms),
                    queue_depth: snap.queue_depth,
                    processed_count: snap.counters.processed,
                    failures: snap.counters.failures,
                },
            )
        })
        .collect()
}
