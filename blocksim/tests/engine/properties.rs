//! Property tests over small random pipelines.

use blocksim::{Engine, SimParams, SimulationRequest, approx::approximate, sim::duration_to_millis};
use proptest::prelude::*;

use crate::{pipeline, set_params, stimuli};

const IDS: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Debug, Clone)]
struct BlockShape {
    processing_time_ms: f64,
    failure_rate: f64,
    queue_capacity: u8,
}

fn block_shape() -> impl Strategy<Value = BlockShape> {
    (0u32..200, 0u32..=100, 0u8..5).prop_map(|(pt, rate, cap)| BlockShape {
        processing_time_ms: f64::from(pt),
        failure_rate: f64::from(rate) / 100.0,
        queue_capacity: cap,
    })
}

fn request_strategy() -> impl Strategy<Value = SimulationRequest> {
    (
        prop::collection::vec(block_shape(), 1..=IDS.len()),
        prop::collection::vec((0usize..4, 0usize..4), 0..5),
        prop::collection::vec((0u32..1_500, 0usize..4), 0..20),
        0u32..2_000,
        any::<u64>(),
    )
        .prop_map(|(blocks, edges, events, duration, seed)| {
            let ids = &IDS[..blocks.len()];
            // forward edges only, so zero-time cycles cannot exhaust the budget
            let edges: Vec<(&str, &str)> = edges
                .into_iter()
                .filter(|(s, t)| s < t && *t < ids.len())
                .map(|(s, t)| (ids[s], ids[t]))
                .collect();
            let mut request = pipeline(ids, &edges, f64::from(duration));
            for (id, shape) in ids.iter().zip(&blocks) {
                set_params(
                    &mut request,
                    id,
                    SimParams {
                        processing_time_ms: Some(shape.processing_time_ms),
                        failure_rate: Some(shape.failure_rate),
                        queue_capacity: Some(f64::from(shape.queue_capacity)),
                        throughput_per_sec: None,
                    },
                );
            }
            for (time, target) in events {
                stimuli(&mut request, ids[target % ids.len()], f64::from(time), 1);
            }
            request.seed = Some(seed);
            request
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn metrics_stay_within_bounds(request in request_strategy()) {
        let engine = Engine::default();
        let plan = engine.plan(&request).expect("generated requests are valid");
        let output = engine.run(&plan).expect("run completes");

        prop_assert_eq!(output.metrics.len(), plan.topology.len());
        for (pos, block_id) in plan.topology.blocks().iter().enumerate() {
            let metrics = &output.metrics[block_id];
            let queue = output.queues[block_id];
            prop_assert!((0.0..=1.0).contains(&metrics.utilization));
            prop_assert!(metrics.processed_count + metrics.failures <= queue.accepted);
            prop_assert!(metrics.queue_depth <= plan.params[pos].queue_capacity);
        }
    }

    #[test]
    fn timeline_is_chronological_and_bounded(request in request_strategy()) {
        let engine = Engine::default();
        let plan = engine.plan(&request).expect("generated requests are valid");
        let output = engine.run(&plan).expect("run completes");

        for pair in output.timeline.windows(2) {
            prop_assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
        }
        for entry in &output.timeline {
            prop_assert!(entry.timestamp_ms <= plan.duration_ms);
        }
        prop_assert_eq!(duration_to_millis(output.stats.simulated_time), plan.duration_ms);
    }

    #[test]
    fn zero_duration_runs_do_nothing(mut request in request_strategy()) {
        request.scenario.duration_ms = Some(0.0);
        let response = Engine::default().simulate(&request);
        prop_assert!(response.timeline.is_empty());
        for metrics in response.metrics.values() {
            prop_assert_eq!(metrics.processed_count, 0);
            prop_assert_eq!(metrics.failures, 0);
            prop_assert_eq!(metrics.utilization, 0.0);
            prop_assert_eq!(metrics.queue_depth, 0);
        }
    }

    #[test]
    fn approximation_is_pure(request in request_strategy()) {
        let plan = Engine::default().plan(&request).expect("generated requests are valid");
        let blocks = || plan.topology.blocks().iter().map(String::as_str).zip(plan.params.iter());
        let first = approximate(blocks(), plan.duration_ms);
        let second = approximate(blocks(), plan.duration_ms);
        prop_assert_eq!(&first, &second);
        for metrics in first.values() {
            prop_assert!((0.0..=1.0).contains(&metrics.utilization));
            prop_assert_eq!(metrics.queue_depth, 0);
        }
    }
}
