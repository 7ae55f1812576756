//! Scenario tests: small pipelines with hand-checked outcomes.

use blocksim::{
    BlockMetrics, Engine, EngineConfig, Node, RunStatus, SimParams, TimelineEventType,
};

use crate::{params, pipeline, set_params, set_script, stimuli};

#[test]
fn same_timestamp_burst_into_capacity_one_queue() {
    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_params(
        &mut request,
        "b",
        SimParams {
            queue_capacity: Some(1.0),
            ..params(100.0, 0.0)
        },
    );
    stimuli(&mut request, "b", 10.0, 2);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);

    let kinds: Vec<(TimelineEventType, &str)> = response
        .timeline
        .iter()
        .map(|e| (e.event_type, e.detail.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (TimelineEventType::Stimulus, "signal=trigger"),
            (TimelineEventType::Stimulus, "signal=trigger dropped (queue full)"),
            (TimelineEventType::Processed, "item 1 done in 100.0ms"),
        ]
    );
    assert_eq!(response.metrics["b"].processed_count, 1);
    assert_eq!(response.metrics["b"].queue_depth, 0);
}

#[test]
fn saturated_block_processes_until_the_bound() {
    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_params(&mut request, "b", params(100.0, 0.0));
    stimuli(&mut request, "b", 0.0, 12);

    let response = Engine::default().simulate(&request);
    assert_eq!(
        response.metrics["b"],
        BlockMetrics {
            utilization: 1.0,
            queue_depth: 1,
            processed_count: 10,
            failures: 0,
        }
    );
    let last = response.timeline.last().expect("entries");
    assert_eq!(last.timestamp_ms, 1_000.0);
    assert_eq!(last.detail, "item 10 done in 100.0ms");
}

#[test]
fn always_failing_block_stops_the_pipeline() {
    let mut request = pipeline(&["a", "b"], &[("a", "b")], 1_000.0);
    set_params(&mut request, "a", params(50.0, 1.0));
    stimuli(&mut request, "a", 0.0, 3);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.metrics["a"].failures, 3);
    assert_eq!(response.metrics["a"].processed_count, 0);
    assert_eq!(response.metrics["a"].utilization, 0.15);
    assert_eq!(response.metrics["b"].processed_count, 0);
    assert!(
        response
            .timeline
            .iter()
            .filter(|e| e.event_type == TimelineEventType::Failure)
            .all(|e| e.detail.ends_with("failed after 50.0ms"))
    );
}

#[test]
fn duplicate_edges_deliver_one_copy_each() {
    let mut request = pipeline(&["a", "b"], &[("a", "b"), ("a", "b")], 10_000.0);
    set_params(&mut request, "a", params(10.0, 0.0));
    set_params(&mut request, "b", params(10.0, 0.0));
    stimuli(&mut request, "a", 0.0, 2);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.metrics["a"].processed_count, 2);
    assert_eq!(response.metrics["b"].processed_count, 4);
}

#[test]
fn downstream_drops_are_silent() {
    let mut request = pipeline(&["a", "b"], &[("a", "b")], 10_000.0);
    set_params(&mut request, "a", params(0.0, 0.0));
    set_params(
        &mut request,
        "b",
        SimParams {
            queue_capacity: Some(1.0),
            ..params(1_000.0, 0.0)
        },
    );
    stimuli(&mut request, "a", 0.0, 5);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);
    assert_eq!(response.metrics["a"].processed_count, 5);
    // b takes the first item, buffers one more and drops the rest
    assert_eq!(response.metrics["b"].processed_count, 2);
    assert!(response.errors.is_empty());
}

#[test]
fn faulting_script_falls_back_without_errors() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_params(&mut request, "b", params(100.0, 0.0));
    set_script(&mut request, "b", "processing_time_ms = 1 / 0");
    stimuli(&mut request, "b", 0.0, 3);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);
    assert!(response.errors.is_empty());
    assert_eq!(response.metrics["b"].processed_count, 3);
    assert_eq!(response.metrics["b"].utilization, 0.3);
}

#[test]
fn uncompilable_script_falls_back_without_errors() {
    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_script(&mut request, "b", "import os; os.system('true')");
    stimuli(&mut request, "b", 0.0, 1);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);
    assert!(response.errors.is_empty());
    assert_eq!(response.metrics["b"].processed_count, 1);
}

#[test]
fn script_controls_duration_and_failure() {
    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_script(
        &mut request,
        "b",
        "processing_time_ms = now < 100 ? 20 : 40\nfailed = now >= 100",
    );
    stimuli(&mut request, "b", 0.0, 1);
    stimuli(&mut request, "b", 200.0, 1);

    let response = Engine::default().simulate(&request);
    let outcomes: Vec<(f64, &str)> = response
        .timeline
        .iter()
        .filter(|e| e.event_type != TimelineEventType::Stimulus)
        .map(|e| (e.timestamp_ms, e.detail.as_str()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (20.0, "item 1 done in 20.0ms"),
            (240.0, "item 2 failed after 40.0ms"),
        ]
    );
}

#[test]
fn stimuli_after_the_bound_are_never_delivered() {
    let mut request = pipeline(&["b"], &[], 500.0);
    stimuli(&mut request, "b", 100.0, 1);
    stimuli(&mut request, "b", 900.0, 1);

    let response = Engine::default().simulate(&request);
    let stimulus_entries = response
        .timeline
        .iter()
        .filter(|e| e.event_type == TimelineEventType::Stimulus)
        .count();
    assert_eq!(stimulus_entries, 1);
}

#[test]
fn unknown_targets_and_non_block_nodes_are_ignored() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let mut request = pipeline(&["b"], &[("b", "req")], 1_000.0);
    request.project_json.nodes.push(Node {
        id: "req".to_string(),
        kind: "requirement".to_string(),
    });
    stimuli(&mut request, "req", 0.0, 1);
    stimuli(&mut request, "nowhere", 0.0, 1);
    stimuli(&mut request, "b", 0.0, 1);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);
    assert_eq!(response.metrics.len(), 1);
    assert_eq!(response.metrics["b"].processed_count, 1);
    assert_eq!(response.timeline.len(), 2);
}

#[test]
fn zero_duration_reports_zero_work() {
    let mut request = pipeline(&["a", "b"], &[("a", "b")], 0.0);
    stimuli(&mut request, "a", 0.0, 3);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);
    for metrics in response.metrics.values() {
        assert_eq!(metrics.utilization, 0.0);
        assert_eq!(metrics.processed_count, 0);
        assert_eq!(metrics.queue_depth, 0);
    }
}

#[test]
fn approximation_mode_matches_closed_form() {
    let mut request = pipeline(&["b"], &[], 10_000.0);
    set_params(&mut request, "b", params(100.0, 0.0));

    let response = Engine::new(EngineConfig::approximate()).simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.metrics["b"],
        BlockMetrics {
            utilization: 1.0,
            queue_depth: 0,
            processed_count: 100,
            failures: 0,
        }
    );
}

#[test]
fn malformed_parameters_never_start_a_run() {
    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_params(
        &mut request,
        "b",
        SimParams {
            processing_time_ms: Some(-5.0),
            ..SimParams::default()
        },
    );
    stimuli(&mut request, "b", 0.0, 1);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Error);
    assert!(response.metrics.is_empty());
    assert!(response.timeline.is_empty());
    assert_eq!(response.errors.len(), 1);
}

#[test]
fn unschedulable_script_duration_falls_back() {
    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_params(&mut request, "b", params(100.0, 0.0));
    set_script(&mut request, "b", "processing_time_ms = 1e17");
    stimuli(&mut request, "b", 0.0, 1);

    let response = Engine::default().simulate(&request);
    assert_eq!(response.status, RunStatus::Complete);
    assert!(response.errors.is_empty());
    assert_eq!(response.metrics["b"].processed_count, 1);
    assert_eq!(response.timeline[1].detail, "item 1 done in 100.0ms");
}

#[test]
fn scripts_see_stimulus_sequence_numbers() {
    let mut request = pipeline(&["b"], &[], 1_000.0);
    set_script(&mut request, "b", "processing_time_ms = item.seq * 2");
    stimuli(&mut request, "b", 0.0, 3);

    let response = Engine::default().simulate(&request);
    let details: Vec<&str> = response
        .timeline
        .iter()
        .filter(|e| e.event_type == TimelineEventType::Processed)
        .map(|e| e.detail.as_str())
        .collect();
    assert_eq!(
        details,
        vec![
            "item 1 done in 2.0ms",
            "item 2 done in 4.0ms",
            "item 3 done in 6.0ms",
        ]
    );
}
