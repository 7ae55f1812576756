//! The block process: take an item, process it, forward the result.

use std::{cell::RefCell, rc::Rc};

use tracing::trace;

use crate::{
    error::SimulationResult,
    item::Item,
    model::{BlockParams, TimelineEventType},
    policy::BlockPolicy,
    sim::WeakEnvironment,
    store::Store,
    timeline::Timeline,
};

/// Per-block work counters, read by the metrics aggregator after halt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockCounters {
    /// Items completed successfully.
    pub processed: u64,
    /// Items that failed.
    pub failures: u64,
    /// Sum of processing durations of completed and failed items.
    pub busy_time_ms: f64,
}

/// One simulated block.
///
/// Runs forever as a process: suspend on the input store, ask the policy
/// for a decision, suspend for the decided duration, record the outcome and
/// on success offer a forwarded item to every downstream store. Items the
/// downstream stores refuse are dropped silently. The environment halting
/// mid-item abandons that item.
#[derive(Debug, Clone)]
pub struct BlockProcess {
    id: String,
    params: BlockParams,
    policy: BlockPolicy,
    input: Store<Item>,
    downstream: Vec<Store<Item>>,
    counters: Rc<RefCell<BlockCounters>>,
    timeline: Timeline,
}

impl BlockProcess {
    /// Creates a block reading from `input`.
    pub fn new(
        id: impl Into<String>,
        params: BlockParams,
        policy: BlockPolicy,
        input: Store<Item>,
        timeline: Timeline,
    ) -> Self {
        Self {
            id: id.into(),
            params,
            policy,
            input,
            downstream: Vec::new(),
            counters: Rc::new(RefCell::new(BlockCounters::default())),
            timeline,
        }
    }

    /// Adds a downstream store. Adding the same store twice forwards two copies.
    pub fn connect(&mut self, target: Store<Item>) {
        self.downstream.push(target);
    }

    /// Shared handle to the counters.
    pub fn counters(&self) -> Rc<RefCell<BlockCounters>> {
        self.counters.clone()
    }

    /// Block id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Process body. Only returns on an environment fault.
    pub async fn run(self, env: WeakEnvironment) -> SimulationResult<()> {
        let mut seq: u64 = 0;
        loop {
            let item = self.input.get().await?;
            seq += 1;

            let now_ms = env.now_millis()?;
            let decision = env.with_rng(|rng| {
                self.policy
                    .decide(&self.id, &item, &self.params, now_ms, rng)
            })?;
            trace!(block = %self.id, item = %item, seq, ?decision, "Processing");

            env.timeout_millis(decision.processing_time_ms)?.await?;

            let done_ms = env.now_millis()?;
            let elapsed = decision.processing_time_ms;
            {
                let mut counters = self.counters.borrow_mut();
                counters.busy_time_ms += elapsed;
                if decision.failed {
                    counters.failures += 1;
                } else {
                    counters.processed += 1;
                }
            }

            if decision.failed {
                self.timeline.record(
                    done_ms,
                    &self.id,
                    TimelineEventType::Failure,
                    format!("item {seq} failed after {elapsed:.1}ms"),
                );
                continue;
            }

            self.timeline.record(
                done_ms,
                &self.id,
                TimelineEventType::Processed,
                format!("item {seq} done in {elapsed:.1}ms"),
            );
            for target in &self.downstream {
                target.try_put(Item::Forwarded {
                    seq,
                    source: self.id.clone(),
                })?;
            }
        }
    }
}
