//! Delivery of scenario stimuli into block queues.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    error::SimulationResult,
    item::Item,
    model::{StimulusEvent, TimelineEventType},
    sim::{WeakEnvironment, millis_to_duration},
    store::Store,
    timeline::Timeline,
};

/// Process that walks the scenario in timestamp order.
///
/// The injector sleeps until each stimulus time, then offers a stimulus item
/// to the target block's store and records a `stimulus` timeline entry,
/// whether or not the store accepted it. Stimuli due at or before the
/// current time are delivered without suspending, so a burst sharing one
/// timestamp lands before any block woken by it runs.
#[derive(Debug)]
pub struct Injector {
    stimuli: Vec<StimulusEvent>,
    targets: HashMap<String, Store<Item>>,
    timeline: Timeline,
}

impl Injector {
    /// Creates an injector over `stimuli`, sorted stably by time.
    pub fn new(
        mut stimuli: Vec<StimulusEvent>,
        targets: HashMap<String, Store<Item>>,
        timeline: Timeline,
    ) -> Self {
        stimuli.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));
        Self {
            stimuli,
            targets,
            timeline,
        }
    }

    /// Process body.
    pub async fn run(self, env: WeakEnvironment) -> SimulationResult<()> {
        let mut offered: HashMap<&str, u64> = HashMap::new();
        for stimulus in self.stimuli {
            let due = millis_to_duration(stimulus.time_ms.max(0.0))?;
            let now = env.now()?;
            if due > now {
                env.timeout(due - now)?.await?;
            }

            let Some(target) = stimulus
                .target_block_id
                .as_deref()
                .and_then(|id| self.targets.get_key_value(id))
            else {
                warn!(
                    target = ?stimulus.target_block_id,
                    time_ms = stimulus.time_ms,
                    "Skipping stimulus for unknown block"
                );
                continue;
            };
            let (block_id, store) = (target.0.as_str(), target.1);
            let seq = offered.entry(block_id).or_default();
            *seq += 1;

            let accepted = store.try_put(Item::Stimulus {
                seq: *seq,
                signal_type: stimulus.signal_type.clone(),
                value: stimulus.value,
            })?;
            let mut detail = format!("signal={}", stimulus.signal_type);
            if !accepted {
                detail.push_str(" dropped (queue full)");
                debug!(block = block_id, "Stimulus dropped, queue full");
            }
            self.timeline.record(
                env.now_millis()?,
                block_id,
                TimelineEventType::Stimulus,
                detail,
            );
        }
        Ok(())
    }
}
