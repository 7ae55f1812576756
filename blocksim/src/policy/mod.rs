//! Per-item processing policies.
//!
//! A block decides, for every item it takes from its queue, whether the item
//! fails and how much simulated time processing takes. The parametric model
//! uses the block's fixed processing time and failure probability. A custom
//! policy (a native [`ItemPolicy`] or a compiled [`Program`]) may compute
//! both from the item, the parameters and the current time.
//!
//! Custom policies can never abort a run: any error, panic, or unusable
//! duration is logged and the parametric decision is used for that item.

mod script;

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    rc::Rc,
};

use tracing::warn;

pub use script::{Program, ScriptContext, Value};

use crate::{
    error::{PolicyError, ScriptError},
    item::Item,
    model::BlockParams,
    sim::{SimRng, millis_to_duration},
};

/// Outcome of processing one item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyDecision {
    /// Whether the item fails.
    pub failed: bool,
    /// Simulated time spent on the item.
    pub processing_time_ms: f64,
}

/// A custom per-item policy.
pub trait ItemPolicy {
    /// Decides the outcome for `item` at simulated time `now_ms`.
    ///
    /// `rng` is the run-scoped generator; drawing from it keeps runs
    /// reproducible for a fixed seed.
    fn decide(
        &self,
        item: &Item,
        params: &BlockParams,
        now_ms: f64,
        rng: &mut SimRng,
    ) -> Result<PolicyDecision, PolicyError>;
}

/// Adapts a closure into an [`ItemPolicy`].
pub struct FnPolicy<F>(pub F);

impl<F> ItemPolicy for FnPolicy<F>
where
    F: Fn(&Item, &BlockParams, f64, &mut SimRng) -> Result<PolicyDecision, PolicyError>,
{
    fn decide(
        &self,
        item: &Item,
        params: &BlockParams,
        now_ms: f64,
        rng: &mut SimRng,
    ) -> Result<PolicyDecision, PolicyError> {
        (self.0)(item, params, now_ms, rng)
    }
}

/// A policy backed by a script from the request.
///
/// A script that does not compile is kept as its compile error so every
/// item reports the fault and falls back.
#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    program: Result<Program, ScriptError>,
}

impl ScriptPolicy {
    /// Compiles `src`.
    pub fn compile(src: &str) -> Self {
        Self {
            program: Program::compile(src),
        }
    }

    /// The compile error, if the script did not compile.
    pub fn compile_error(&self) -> Option<&ScriptError> {
        self.program.as_ref().err()
    }
}

impl ItemPolicy for ScriptPolicy {
    fn decide(
        &self,
        item: &Item,
        params: &BlockParams,
        now_ms: f64,
        rng: &mut SimRng,
    ) -> Result<PolicyDecision, PolicyError> {
        let program = self.program.as_ref().map_err(|e| e.clone())?;
        let mut ctx = ScriptContext {
            item,
            params,
            now_ms,
            rng,
        };
        Ok(program.evaluate(&mut ctx)?)
    }
}

/// The policy a block applies to each item.
#[derive(Clone, Default)]
pub enum BlockPolicy {
    /// Fixed processing time, failures drawn with the configured probability.
    #[default]
    Parametric,
    /// Custom policy with parametric fallback.
    Custom(Rc<dyn ItemPolicy>),
}

impl fmt::Debug for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPolicy::Parametric => f.write_str("Parametric"),
            BlockPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl BlockPolicy {
    /// Wraps a custom policy.
    pub fn custom(policy: impl ItemPolicy + 'static) -> Self {
        BlockPolicy::Custom(Rc::new(policy))
    }

    /// Returns the decision for `item`. Never fails.
    pub fn decide(
        &self,
        block_id: &str,
        item: &Item,
        params: &BlockParams,
        now_ms: f64,
        rng: &mut SimRng,
    ) -> PolicyDecision {
        match self {
            BlockPolicy::Parametric => parametric(params, rng),
            BlockPolicy::Custom(policy) => {
                match run_custom(policy.as_ref(), item, params, now_ms, rng) {
                    Ok(decision) => decision,
                    Err(err) => {
                        warn!(
                            block = block_id,
                            item = %item,
                            error = %err,
                            "Custom policy fault, using parametric model"
                        );
                        parametric(params, rng)
                    }
                }
            }
        }
    }
}

fn parametric(params: &BlockParams, rng: &mut SimRng) -> PolicyDecision {
    PolicyDecision {
        failed: rng.random_f64() < params.failure_rate,
        processing_time_ms: params.processing_time_ms,
    }
}

fn run_custom(
    policy: &dyn ItemPolicy,
    item: &Item,
    params: &BlockParams,
    now_ms: f64,
    rng: &mut SimRng,
) -> Result<PolicyDecision, PolicyError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| policy.decide(item, params, now_ms, rng)))
        .map_err(|payload| PolicyError::Panicked(panic_message(payload.as_ref())))?;
    let decision = outcome?;
    let ms = decision.processing_time_ms;
    if millis_to_duration(ms).is_err() {
        return Err(PolicyError::InvalidDuration(ms));
    }
    Ok(decision)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
