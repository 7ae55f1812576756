//! Engine configuration.
//!
//! | Setting | Field | Default |
//! |---------|-------|---------|
//! | Execution mode | `mode` | [`EngineMode::Full`] |
//! | RNG seed | `seed` | 0 |
//! | Duration when the scenario gives none | `default_duration_ms` | 10000 |
//! | Wake-up budget per run | `max_events` | 10,000,000 |

/// How requests are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// Discrete-event simulation.
    #[default]
    Full,
    /// Closed-form approximation only; responses carry an advisory notice.
    Approximate,
}

/// Configuration shared by every request an engine evaluates.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Execution mode.
    pub mode: EngineMode,
    /// Seed for runs whose request does not carry one.
    pub seed: u64,
    /// Duration bound used when the scenario omits `duration_ms`.
    pub default_duration_ms: f64,
    /// Maximum wake-ups a single run may process before it is aborted.
    ///
    /// Bounds graphs with zero-duration cycles, which would otherwise spin
    /// at a single instant.
    pub max_events: u64,
}

impl EngineConfig {
    /// Default duration bound in milliseconds.
    pub const DEFAULT_DURATION_MS: f64 = 10_000.0;
    /// Default wake-up budget.
    pub const DEFAULT_MAX_EVENTS: u64 = 10_000_000;

    /// Configuration for the closed-form path.
    pub fn approximate() -> Self {
        Self::default().with_mode(EngineMode::Approximate)
    }

    /// Sets the execution mode.
    pub fn with_mode(mut self, mode: EngineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the default seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the duration used when a scenario omits one.
    pub fn with_default_duration_ms(mut self, duration_ms: f64) -> Self {
        self.default_duration_ms = duration_ms;
        self
    }

    /// Sets the per-run wake-up budget.
    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = max_events;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Full,
            seed: 0,
            default_duration_ms: Self::DEFAULT_DURATION_MS,
            max_events: Self::DEFAULT_MAX_EVENTS,
        }
    }
}
