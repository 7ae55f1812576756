//! Request evaluation: validation, dispatch and the full simulation run.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, info, instrument, warn};

use crate::{
    approx::{APPROXIMATION_NOTICE, approximate},
    config::{EngineConfig, EngineMode},
    error::{RequestError, SimulationResult},
    injector::Injector,
    item::Item,
    metrics::{BlockSnapshot, aggregate},
    model::{
        BlockMetrics, BlockParams, SimulationRequest, SimulationResponse, StimulusEvent,
        TimelineEntry,
    },
    policy::{BlockPolicy, ItemPolicy, ScriptPolicy},
    process::BlockProcess,
    sim::{Environment, RunStats, millis_to_duration},
    store::Store,
    timeline::Timeline,
    topology::Topology,
};

/// A validated request, ready to run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Blocks and routes.
    pub topology: Topology,
    /// Resolved parameters, indexed like [`Topology::blocks`].
    pub params: Vec<BlockParams>,
    /// Policy scripts, indexed like [`Topology::blocks`].
    pub scripts: Vec<Option<String>>,
    /// Duration bound.
    pub duration_ms: f64,
    /// Scenario stimuli in request order.
    pub stimuli: Vec<StimulusEvent>,
    /// Seed of the run generator.
    pub seed: u64,
}

/// Input queue totals of one block over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Items the queue accepted.
    pub accepted: u64,
    /// Items refused because the queue was full.
    pub dropped: u64,
}

/// Result of a full simulation run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Per-block metrics.
    pub metrics: BTreeMap<String, BlockMetrics>,
    /// Per-block queue totals.
    pub queues: BTreeMap<String, QueueStats>,
    /// Chronological timeline.
    pub timeline: Vec<TimelineEntry>,
    /// Scheduler counters.
    pub stats: RunStats,
}

/// Evaluates simulation requests.
///
/// The engine keeps no state between requests apart from its configuration
/// and any registered native policies; every run builds a fresh environment.
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    policies: HashMap<String, BlockPolicy>,
}

impl Engine {
    /// Creates an engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            policies: HashMap::new(),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a native policy for `block_id`, taking precedence over any
    /// script the request carries for that block.
    pub fn register_policy(
        &mut self,
        block_id: impl Into<String>,
        policy: impl ItemPolicy + 'static,
    ) {
        self.policies
            .insert(block_id.into(), BlockPolicy::custom(policy));
    }

    /// Evaluates a request. Never fails: faults become error responses.
    #[instrument(skip_all, fields(scenario = request.scenario.id.as_deref().unwrap_or("")))]
    pub fn simulate(&self, request: &SimulationRequest) -> SimulationResponse {
        let plan = match self.plan(request) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "Rejecting malformed request");
                return SimulationResponse::error(err.to_string());
            }
        };

        match self.config.mode {
            EngineMode::Approximate => {
                let blocks = plan
                    .topology
                    .blocks()
                    .iter()
                    .map(String::as_str)
                    .zip(plan.params.iter());
                let metrics = approximate(blocks, plan.duration_ms);
                SimulationResponse::complete(
                    metrics,
                    Vec::new(),
                    vec![APPROXIMATION_NOTICE.to_string()],
                )
            }
            EngineMode::Full => match self.run(&plan) {
                Ok(output) => {
                    SimulationResponse::complete(output.metrics, output.timeline, Vec::new())
                }
                Err(err) => {
                    error!(error = %err, "Simulation failed");
                    SimulationResponse::error(err.to_string())
                }
            },
        }
    }

    /// Validates a request and applies defaults.
    pub fn plan(&self, request: &SimulationRequest) -> Result<RunPlan, RequestError> {
        let duration_ms = request
            .scenario
            .duration_ms
            .unwrap_or(self.config.default_duration_ms);
        if !duration_ms.is_finite()
            || duration_ms < 0.0
            || millis_to_duration(duration_ms).is_err()
        {
            return Err(RequestError::out_of_range(
                "scenario.duration_ms",
                format!("expected a non-negative number, got {duration_ms}"),
            ));
        }

        for (i, stimulus) in request.scenario.events.iter().enumerate() {
            if !stimulus.time_ms.is_finite()
                || millis_to_duration(stimulus.time_ms.max(0.0)).is_err()
            {
                return Err(RequestError::out_of_range(
                    format!("scenario.events[{i}].time_ms"),
                    format!("expected a finite time, got {}", stimulus.time_ms),
                ));
            }
        }

        let topology = Topology::from_graph(&request.project_json);
        let mut params = Vec::with_capacity(topology.len());
        let mut scripts = Vec::with_capacity(topology.len());
        for block_id in topology.blocks() {
            let behavior = request.block_behaviors.get(block_id);
            params.push(
                behavior
                    .map(|b| b.sim_params.resolve(block_id))
                    .transpose()?
                    .unwrap_or_default(),
            );
            scripts.push(
                behavior
                    .and_then(|b| b.sim_script.clone())
                    .filter(|s| !s.trim().is_empty()),
            );
        }

        Ok(RunPlan {
            topology,
            params,
            scripts,
            duration_ms,
            stimuli: request.scenario.events.clone(),
            seed: request.seed.unwrap_or(self.config.seed),
        })
    }

    fn policy_for(&self, block_id: &str, script: Option<&str>) -> BlockPolicy {
        if let Some(policy) = self.policies.get(block_id) {
            return policy.clone();
        }
        match script {
            Some(src) => {
                let policy = ScriptPolicy::compile(src);
                if let Some(err) = policy.compile_error() {
                    warn!(
                        block = block_id,
                        error = %err,
                        "Policy script does not compile, using parametric model"
                    );
                }
                BlockPolicy::custom(policy)
            }
            None => BlockPolicy::Parametric,
        }
    }

    /// Runs the discrete-event simulation for a validated plan.
    ///
    /// A zero duration starts no process, so every block reports zero work.
    #[instrument(
        skip_all,
        fields(blocks = plan.topology.len(), duration_ms = plan.duration_ms, seed = plan.seed)
    )]
    pub fn run(&self, plan: &RunPlan) -> SimulationResult<RunOutput> {
        let env = Environment::new_with_seed(plan.seed).with_event_budget(self.config.max_events);
        let timeline = Timeline::new();
        let topology = &plan.topology;

        let stores: Vec<Store<Item>> = plan
            .params
            .iter()
            .map(|p| Store::new(&env, p.queue_capacity))
            .collect();

        let mut counters = Vec::with_capacity(topology.len());
        let mut blocks = Vec::with_capacity(topology.len());
        for (pos, block_id) in topology.blocks().iter().enumerate() {
            let policy = self.policy_for(block_id, plan.scripts[pos].as_deref());
            let mut block = BlockProcess::new(
                block_id.clone(),
                plan.params[pos],
                policy,
                stores[pos].clone(),
                timeline.clone(),
            );
            for &target in topology.downstream(pos) {
                block.connect(stores[target].clone());
            }
            counters.push(block.counters());
            blocks.push(block);
        }

        if plan.duration_ms > 0.0 {
            for block in blocks {
                let name = block.id().to_string();
                env.process(name, block.run(env.downgrade()));
            }
            if !plan.stimuli.is_empty() {
                let targets = topology
                    .blocks()
                    .iter()
                    .cloned()
                    .zip(stores.iter().cloned())
                    .collect();
                let injector = Injector::new(plan.stimuli.clone(), targets, timeline.clone());
                env.process("injector", injector.run(env.downgrade()));
            }
        }

        info!("Simulation starting");
        let stats = env.run(millis_to_duration(plan.duration_ms)?)?;
        debug!(
            events = stats.events_processed,
            live_processes = stats.live_processes,
            timeline_entries = timeline.len(),
            "Simulation halted"
        );

        let snapshots: Vec<_> = counters.iter().map(|c| c.borrow()).collect();
        let metrics = aggregate(
            topology
                .blocks()
                .iter()
                .zip(snapshots.iter())
                .zip(stores.iter())
                .map(|((block_id, counters), store)| BlockSnapshot {
                    block_id,
                    counters,
                    queue_depth: store.len(),
                }),
            plan.duration_ms,
        );

        let queues = topology
            .blocks()
            .iter()
            .zip(stores.iter())
            .map(|(block_id, store)| {
                (
                    block_id.clone(),
                    QueueStats {
                        accepted: store.accepted(),
                        dropped: store.dropped(),
                    },
                )
            })
            .collect();

        Ok(RunOutput {
            metrics,
            queues,
            timeline: timeline.take(),
            stats,
        })
    }
}
