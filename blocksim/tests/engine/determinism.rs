//! Same request and seed, same bytes.

use blocksim::{Engine, EngineConfig, SimulationRequest, protocol as wire};

use crate::{params, pipeline, set_params, set_script, stimuli};

fn noisy_pipeline(seed: u64) -> SimulationRequest {
    let mut request = pipeline(
        &["src", "mid", "sink"],
        &[("src", "mid"), ("mid", "sink"), ("src", "sink")],
        5_000.0,
    );
    set_params(&mut request, "src", params(20.0, 0.3));
    set_params(&mut request, "mid", params(35.0, 0.5));
    set_script(
        &mut request,
        "sink",
        "processing_time_ms = 5 + random() * 45\nfailed = random() < 0.2",
    );
    for t in 0..40 {
        stimuli(&mut request, "src", f64::from(t * 25), 1);
    }
    request.seed = Some(seed);
    request
}

fn encoded(engine: &Engine, request: &SimulationRequest) -> String {
    wire::encode_response(&engine.simulate(request))
}

#[test]
fn repeated_runs_are_byte_identical() {
    let engine = Engine::default();
    let request = noisy_pipeline(42);
    let first = encoded(&engine, &request);
    for _ in 0..5 {
        assert_eq!(encoded(&engine, &request), first);
    }
}

#[test]
fn fresh_engines_agree() {
    let request = noisy_pipeline(7);
    let a = encoded(&Engine::new(EngineConfig::default()), &request);
    let b = encoded(&Engine::new(EngineConfig::default().with_max_events(1_000_000)), &request);
    assert_eq!(a, b);
}

#[test]
fn seeds_change_random_outcomes() {
    let engine = Engine::default();
    let outcomes: Vec<String> = (0..8)
        .map(|seed| encoded(&engine, &noisy_pipeline(seed)))
        .collect();
    assert!(outcomes.iter().any(|o| o != &outcomes[0]));
}

#[test]
fn configured_seed_applies_without_a_request_seed() {
    let mut request = noisy_pipeline(0);
    request.seed = None;
    let configured = encoded(&Engine::new(EngineConfig::default().with_seed(42)), &request);
    assert_eq!(configured, encoded(&Engine::default(), &noisy_pipeline(42)));
}
