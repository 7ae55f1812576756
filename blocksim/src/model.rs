//! Wire types for simulation requests and responses.
//!
//! Requests are deliberately lenient: absent or `null` sections read as empty,
//! unknown fields are ignored and numeric parameters are optional (see
//! [`SimParams::resolve`] for the defaults). Shape errors still surface as a
//! [`RequestError`](crate::error::RequestError) before any run starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{error::RequestError, sim::millis_to_duration};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_signal_type() -> String {
    "trigger".to_string()
}

/// One simulation request, as read from a single input line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Block graph to simulate.
    #[serde(default, deserialize_with = "null_as_default")]
    pub project_json: ProjectGraph,
    /// Timed stimuli and the duration bound.
    #[serde(default, deserialize_with = "null_as_default")]
    pub scenario: Scenario,
    /// Per-block behavior, keyed by block id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub block_behaviors: BTreeMap<String, BlockBehavior>,
    /// Overrides the configured seed for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// The project graph: nodes and directed edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectGraph {
    /// All nodes; only those of kind `"block"` are simulated.
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<Node>,
    /// All edges; only those of kind `"connects"` carry items.
    #[serde(default, deserialize_with = "null_as_default")]
    pub edges: Vec<Edge>,
}

/// A graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node identity.
    pub id: String,
    /// Node kind, e.g. `"block"`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub kind: String,
}

impl Node {
    /// Creates a block node.
    pub fn block(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BLOCK_KIND.to_string(),
        }
    }

    /// Returns `true` for nodes of kind `"block"`.
    pub fn is_block(&self) -> bool {
        self.kind == BLOCK_KIND
    }
}

/// A directed graph edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Edge kind, e.g. `"connects"`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub kind: String,
    /// Upstream node id.
    #[serde(default)]
    pub source_id: Option<String>,
    /// Downstream node id.
    #[serde(default)]
    pub target_id: Option<String>,
}

impl Edge {
    /// Creates a `"connects"` edge.
    pub fn connects(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: CONNECTS_KIND.to_string(),
            source_id: Some(source.into()),
            target_id: Some(target.into()),
        }
    }

    /// Returns `true` for edges of kind `"connects"`.
    pub fn is_connects(&self) -> bool {
        self.kind == CONNECTS_KIND
    }
}

pub(crate) const BLOCK_KIND: &str = "block";
pub(crate) const CONNECTS_KIND: &str = "connects";

/// A timed stimulus scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario identity, informational only.
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable name, informational only.
    #[serde(default)]
    pub name: Option<String>,
    /// Upper bound on simulated time.
    #[serde(default)]
    pub duration_ms: Option<f64>,
    /// External stimuli, in any order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<StimulusEvent>,
}

/// One external stimulus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StimulusEvent {
    /// Delivery time.
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_ms: f64,
    /// Block whose queue receives the stimulus.
    #[serde(default, alias = "block_id", alias = "target_id")]
    pub target_block_id: Option<String>,
    /// Signal label recorded on the timeline.
    #[serde(default = "default_signal_type")]
    pub signal_type: String,
    /// Opaque payload carried by the stimulus item.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl StimulusEvent {
    /// Creates a `"trigger"` stimulus for `target` at `time_ms`.
    pub fn new(time_ms: f64, target: impl Into<String>) -> Self {
        Self {
            time_ms,
            target_block_id: Some(target.into()),
            signal_type: default_signal_type(),
            value: serde_json::Value::Null,
        }
    }
}

/// Per-block behavior: parameters plus an optional policy script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockBehavior {
    /// Parametric model inputs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub sim_params: SimParams,
    /// Custom per-item policy in the script language.
    #[serde(default, alias = "policy", skip_serializing_if = "Option::is_none")]
    pub sim_script: Option<String>,
}

/// Raw block parameters as they appear on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    /// Time to process one item.
    #[serde(default)]
    pub processing_time_ms: Option<f64>,
    /// Probability in `[0, 1]` that an item fails.
    #[serde(default)]
    pub failure_rate: Option<f64>,
    /// Input queue capacity.
    #[serde(default)]
    pub queue_capacity: Option<f64>,
    /// Nominal throughput, used by the approximation only.
    #[serde(default)]
    pub throughput_per_sec: Option<f64>,
}

/// Validated block parameters with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockParams {
    /// Time to process one item, non-negative.
    pub processing_time_ms: f64,
    /// Failure probability in `[0, 1]`.
    pub failure_rate: f64,
    /// Input queue capacity.
    pub queue_capacity: usize,
    /// Nominal throughput, non-negative when present.
    pub throughput_per_sec: Option<f64>,
}

impl BlockParams {
    /// Default processing time when none is given.
    pub const DEFAULT_PROCESSING_TIME_MS: f64 = 100.0;
    /// Default queue capacity when none is given.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            processing_time_ms: Self::DEFAULT_PROCESSING_TIME_MS,
            failure_rate: 0.0,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            throughput_per_sec: None,
        }
    }
}

impl SimParams {
    /// Applies defaults and checks ranges.
    ///
    /// Absent values take the [`BlockParams`] defaults; explicit values,
    /// zero included, are kept.
    pub fn resolve(&self, block_id: &str) -> Result<BlockParams, RequestError> {
        let defaults = BlockParams::default();

        let processing_time_ms = self
            .processing_time_ms
            .unwrap_or(defaults.processing_time_ms);
        if millis_to_duration(processing_time_ms).is_err() {
            return Err(RequestError::out_of_range(
                format!("{block_id}.processing_time_ms"),
                format!("expected a schedulable non-negative number, got {processing_time_ms}"),
            ));
        }

        let failure_rate = self.failure_rate.unwrap_or(defaults.failure_rate);
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(RequestError::out_of_range(
                format!("{block_id}.failure_rate"),
                format!("expected a value in [0, 1], got {failure_rate}"),
            ));
        }

        let queue_capacity = match self.queue_capacity {
            None => defaults.queue_capacity,
            Some(c) if c.is_finite() && c >= 0.0 && c <= usize::MAX as f64 => c.trunc() as usize,
            Some(c) => {
                return Err(RequestError::out_of_range(
                    format!("{block_id}.queue_capacity"),
                    format!("expected a non-negative integer, got {c}"),
                ));
            }
        };

        let throughput_per_sec = match self.throughput_per_sec {
            Some(t) if !t.is_finite() || t < 0.0 => {
                return Err(RequestError::out_of_range(
                    format!("{block_id}.throughput_per_sec"),
                    format!("expected a non-negative number, got {t}"),
                ));
            }
            other => other,
        };

        Ok(BlockParams {
            processing_time_ms,
            failure_rate,
            queue_capacity,
            throughput_per_sec,
        })
    }
}

/// Timeline entry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineEventType {
    /// An item completed successfully.
    Processed,
    /// An item failed.
    Failure,
    /// An external stimulus was delivered.
    Stimulus,
}

/// One entry of the run timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Simulated time of the entry.
    pub timestamp_ms: f64,
    /// Block the entry concerns.
    pub block_id: String,
    /// Entry category.
    pub event_type: TimelineEventType,
    /// Human-readable detail.
    pub detail: String,
}

/// Per-block results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetrics {
    /// Busy time over duration, in `[0, 1]`.
    pub utilization: f64,
    /// Items left in the input queue at halt.
    pub queue_depth: usize,
    /// Items completed successfully.
    pub processed_count: u64,
    /// Items that failed.
    pub failures: u64,
}

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Metrics and timeline are valid.
    Complete,
    /// The request was rejected or the run failed.
    Error,
}

/// One simulation response, written as a single output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    /// Outcome.
    pub status: RunStatus,
    /// Per-block results, keyed by block id.
    pub metrics: BTreeMap<String, BlockMetrics>,
    /// Chronological timeline.
    pub timeline: Vec<TimelineEntry>,
    /// Error messages, or advisory notices when `status` is complete.
    pub errors: Vec<String>,
}

impl SimulationResponse {
    /// A complete response.
    pub fn complete(
        metrics: BTreeMap<String, BlockMetrics>,
        timeline: Vec<TimelineEntry>,
        errors: Vec<String>,
    ) -> Self {
        Self {
            status: RunStatus::Complete,
            metrics,
            timeline,
            errors,
        }
    }

    /// An error response with empty metrics and timeline.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            metrics: BTreeMap::new(),
            timeline: Vec::new(),
            errors: vec![message.into()],
        }
    }
}
