//! Wire protocol tests: request lines in, response lines out.

use blocksim::{Engine, EngineConfig, RunStatus, TimelineEventType, protocol as wire};

const SINGLE_BLOCK: &str = r#"{
    "project_json": {"nodes": [{"id": "a", "kind": "block"}], "edges": []},
    "scenario": {"id": "s1", "name": "one", "duration_ms": 1000,
                 "events": [{"time_ms": 0, "target_block_id": "a",
                             "signal_type": "trigger", "value": null}]},
    "block_behaviors": {"a": {"sim_params": {"processing_time_ms": 250}}}
}"#;

fn one_line(json: &str) -> String {
    json.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[test]
fn response_shape_matches_the_wire_format() {
    let engine = Engine::default();
    let response = wire::handle_line(&engine, &one_line(SINGLE_BLOCK)).expect("response");
    let encoded = wire::encode_response(&response);
    let value: serde_json::Value = serde_json::from_str(&encoded).expect("valid json");

    assert_eq!(value["status"], "complete");
    assert_eq!(value["metrics"]["a"]["processed_count"], 1);
    assert_eq!(value["metrics"]["a"]["failures"], 0);
    assert_eq!(value["metrics"]["a"]["queue_depth"], 0);
    assert_eq!(value["metrics"]["a"]["utilization"], 0.25);
    assert_eq!(value["timeline"][0]["event_type"], "stimulus");
    assert_eq!(value["timeline"][1]["event_type"], "processed");
    assert_eq!(value["timeline"][1]["timestamp_ms"], 250.0);
    assert_eq!(value["timeline"][1]["block_id"], "a");
    assert_eq!(value["errors"], serde_json::json!([]));
}

#[test]
fn a_bad_line_does_not_poison_the_next() {
    let engine = Engine::default();
    let lines = ["{\"project_json\":", "", &one_line(SINGLE_BLOCK)];
    let responses: Vec<_> = lines
        .iter()
        .filter_map(|line| wire::handle_line(&engine, line))
        .collect();

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status, RunStatus::Error);
    assert!(responses[0].errors[0].starts_with("JSON parse error: "));
    assert_eq!(responses[1].status, RunStatus::Complete);
    assert_eq!(responses[1].metrics["a"].processed_count, 1);
}

#[test]
fn missing_sections_take_defaults() {
    let engine = Engine::default();
    let response = wire::handle_line(
        &engine,
        concat!(
            r#"{"project_json":{"nodes":[{"id":"a","kind":"block"},"#,
            r#"{"id":"r","kind":"requirement"}]},"scenario":{}}"#,
        ),
    )
    .expect("response");

    assert_eq!(response.status, RunStatus::Complete);
    assert_eq!(response.metrics.len(), 1);
    assert_eq!(response.metrics["a"].processed_count, 0);
    assert!(response.timeline.is_empty());
}

#[test]
fn legacy_field_names_are_accepted() {
    let engine = Engine::default();
    let line = r#"{"project_json":{"nodes":[{"id":"a","kind":"block"}]},
        "scenario":{"duration_ms":500,"events":[{"time_ms":5,"block_id":"a","signal_type":"ping"}]},
        "block_behaviors":{"a":{"sim_params":{"processing_time_ms":10},
            "policy":"failed = item.signal_type == \"ping\""}}}"#;
    let response = wire::handle_line(&engine, &one_line(line)).expect("response");

    assert_eq!(response.status, RunStatus::Complete);
    assert_eq!(response.metrics["a"].failures, 1);
    assert_eq!(response.timeline[0].detail, "signal=ping");
    assert_eq!(response.timeline[1].event_type, TimelineEventType::Failure);
    assert_eq!(response.timeline[1].timestamp_ms, 15.0);
}

#[test]
fn out_of_range_numbers_are_rejected() {
    let engine = Engine::default();
    let graph = r#"{"project_json":{"nodes":[{"id":"a","kind":"block"}]},"#;
    for rest in [
        r#""scenario":{"duration_ms":-1}}"#,
        r#""scenario":{},"block_behaviors":{"a":{"sim_params":{"failure_rate":1.5}}}}"#,
        r#""scenario":{},"block_behaviors":{"a":{"sim_params":{"queue_capacity":-3}}}}"#,
        r#""scenario":{},"block_behaviors":{"a":{"sim_params":{"processing_time_ms":1e14}}}}"#,
    ] {
        let line = format!("{graph}{rest}");
        let response = wire::handle_line(&engine, &line).expect("response");
        assert_eq!(response.status, RunStatus::Error, "{line}");
        assert_eq!(response.errors.len(), 1);
        assert!(response.metrics.is_empty());
    }
}

#[test]
fn request_seed_overrides_configured_seed() {
    let line = r#"{"project_json":{"nodes":[{"id":"a","kind":"block"}]},
        "scenario":{"duration_ms":100000,"events":[]},
        "block_behaviors":{"a":{"sim_params":{"processing_time_ms":1,"failure_rate":0.5}}},
        "seed":99}"#;
    let mut request = wire::parse_request(&one_line(line)).expect("valid request");
    for i in 0..50 {
        request
            .scenario
            .events
            .push(blocksim::StimulusEvent::new(f64::from(i), "a"));
    }

    let first = Engine::new(EngineConfig::default().with_seed(1)).simulate(&request);
    let second = Engine::new(EngineConfig::default().with_seed(2)).simulate(&request);
    assert_eq!(
        wire::encode_response(&first),
        wire::encode_response(&second)
    );
}

#[test]
fn oversized_processing_time_names_the_field() {
    let engine = Engine::default();
    let line = r#"{"project_json":{"nodes":[{"id":"a","kind":"block"}]},
        "scenario":{"duration_ms":1000,"events":[{"time_ms":0,"target_block_id":"a"}]},
        "block_behaviors":{"a":{"sim_params":{"processing_time_ms":1e14}}}}"#;
    let response = wire::handle_line(&engine, &one_line(line)).expect("response");

    assert_eq!(response.status, RunStatus::Error);
    assert!(
        response.errors[0].starts_with("invalid a.processing_time_ms"),
        "{}",
        response.errors[0]
    );
}

#[test]
fn deeply_nested_script_falls_back() {
    let engine = Engine::default();
    let script = format!("failed = {}1{}", "(".repeat(200_000), ")".repeat(200_000));
    let line = serde_json::json!({
        "project_json": {"nodes": [{"id": "a", "kind": "block"}]},
        "scenario": {"duration_ms": 1000, "events": [{"time_ms": 0, "target_block_id": "a"}]},
        "block_behaviors": {"a": {"sim_script": script}},
    })
    .to_string();
    let response = wire::handle_line(&engine, &line).expect("response");

    assert_eq!(response.status, RunStatus::Complete);
    assert!(response.errors.is_empty());
    assert_eq!(response.metrics["a"].processed_count, 1);
    assert_eq!(response.metrics["a"].failures, 0);
}
