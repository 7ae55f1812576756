//! Closed-form estimate of block metrics without running the scheduler.
//!
//! Each block is assumed to be saturated for the whole duration. Queues,
//! edges, stimuli and custom policies play no part, so the result is a pure
//! function of the parameters and the duration.

use std::collections::BTreeMap;

use crate::{
    metrics::round4,
    model::{BlockMetrics, BlockParams},
};

/// Advisory notice attached to approximate results.
pub const APPROXIMATION_NOTICE: &str =
    "Full simulation engine unavailable: results are theoretical approximations only";

/// Estimates the metrics of one block.
pub fn approximate_block(params: &BlockParams, duration_ms: f64) -> BlockMetrics {
    let total = match params.throughput_per_sec {
        Some(rate) if rate > 0.0 => (rate * duration_ms / 1000.0).floor(),
        _ if params.processing_time_ms > 0.0 => (duration_ms / params.processing_time_ms).floor(),
        _ => 0.0,
    };
    let failures = (total * params.failure_rate).floor();
    let utilization = if duration_ms > 0.0 {
        round4((params.processing_time_ms * total / duration_ms).min(1.0))
    } else {
        0.0
    };

    BlockMetrics {
        utilization,
        queue_depth: 0,
        processed_count: (total - failures).max(0.0) as u64,
        failures: failures as u64,
    }
}

/// Estimates the metrics of every block, in block order.
pub fn approximate<'a>(
    blocks: impl IntoIterator<Item = (&'a str, &'a BlockParams)>,
    duration_ms: f64,
) -> BTreeMap<String, BlockMetrics> {
    blocks
        .into_iter()
        .map(|(id, params)| (id.to_string(), approximate_block(params, duration_ms)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(processing_time_ms: f64, failure_rate: f64, throughput: Option<f64>) -> BlockParams {
        BlockParams {
            processing_time_ms,
            failure_rate,
            throughput_per_sec: throughput,
            ..BlockParams::default()
        }
    }

    #[test]
    fn saturated_block() {
        let m = approximate_block(&params(100.0, 0.0, None), 10_000.0);
        assert_eq!(
            m,
            BlockMetrics {
                utilization: 1.0,
                queue_depth: 0,
                processed_count: 100,
                failures: 0,
            }
        );
    }

    #[test]
    fn failures_are_subtracted() {
        let m = approximate_block(&params(100.0, 0.25, None), 1_000.0);
        assert_eq!(m.failures, 2);
        assert_eq!(m.processed_count, 8);
        assert_eq!(m.utilization, 1.0);
    }

    #[test]
    fn throughput_takes_precedence() {
        let m = approximate_block(&params(10.0, 0.0, Some(5.0)), 2_000.0);
        assert_eq!(m.processed_count, 10);
        assert_eq!(m.utilization, 0.05);

        let zero_rate = approximate_block(&params(10.0, 0.0, Some(0.0)), 2_000.0);
        assert_eq!(zero_rate.processed_count, 200);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(approximate_block(&params(0.0, 0.0, None), 1_000.0).processed_count, 0);
        let zero = approximate_block(&params(100.0, 0.0, None), 0.0);
        assert_eq!(zero.processed_count, 0);
        assert_eq!(zero.utilization, 0.0);
    }
}
