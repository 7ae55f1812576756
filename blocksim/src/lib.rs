//! # blocksim
//!
//! Deterministic discrete-event simulation of block pipelines.
//!
//! Given a directed graph of blocks, per-block behavior and a timed scenario
//! of external stimuli, the engine computes throughput, utilization, failure
//! counts and a chronological timeline over a bounded simulated duration.
//!
//! ## Core Components
//!
//! - [`Environment`]: virtual clock, wake-up queue and process table
//! - [`Store`]: bounded per-block input queue with drop-on-full puts
//! - [`BlockProcess`] and [`Injector`]: the processes a run is made of
//! - [`policy`]: parametric and custom per-item decisions
//! - [`Engine`]: request validation, dispatch and result assembly
//! - [`approx`]: scheduler-free closed-form estimate
//!
//! ## Determinism
//!
//! Processes resume strictly in `(time, registration order)`. The only
//! source of randomness is the run-scoped [`SimRng`], seeded from the
//! request or the [`EngineConfig`], so the same request and seed always
//! produce the same response.
//!
//! ```
//! use blocksim::{Engine, EngineConfig, RunStatus, protocol};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let line = r#"{"project_json":{"nodes":[{"id":"a","kind":"block"}]},
//!               "scenario":{"duration_ms":1000,"events":[{"time_ms":0,"target_block_id":"a"}]}}"#;
//! let response = protocol::handle_line(&engine, line).expect("not blank");
//! assert_eq!(response.status, RunStatus::Complete);
//! assert_eq!(response.metrics["a"].processed_count, 1);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod sim;
pub mod store;
pub mod policy;
pub mod process;
pub mod injector;

// =============================================================================
// Requests, Results and Dispatch
// =============================================================================

pub mod model;
pub mod item;
pub mod topology;
pub mod timeline;
pub mod metrics;
pub mod approx;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{EngineConfig, EngineMode};
pub use engine::{Engine, QueueStats, RunOutput, RunPlan};
pub use error::{PolicyError, RequestError, ScriptError, SimulationError, SimulationResult};
pub use injector::Injector;
pub use item::Item;
pub use model::{
    BlockBehavior, BlockMetrics, BlockParams, Edge, Node, ProjectGraph, RunStatus, Scenario,
    SimParams, SimulationRequest, SimulationResponse, StimulusEvent, TimelineEntry,
    TimelineEventType,
};
pub use policy::{BlockPolicy, FnPolicy, ItemPolicy, PolicyDecision, ScriptPolicy};
pub use process::{BlockCounters, BlockProcess};
pub use sim::{Environment, RunStats, SimRng, WeakEnvironment};
pub use store::Store;
pub use timeline::Timeline;
pub use topology::Topology;
