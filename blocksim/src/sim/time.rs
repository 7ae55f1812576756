//! Conversions between wire-level millisecond numbers and simulation time.
//!
//! Simulation time is a [`Duration`] with nanosecond resolution. Requests and
//! responses speak fractional milliseconds; going through whole nanoseconds
//! keeps integral millisecond values exact in both directions.

use std::time::Duration;

use crate::error::{SimulationError, SimulationResult};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Convert a millisecond delay into simulation time.
///
/// Fails with [`SimulationError::InvalidDelay`] when `ms` is negative, not
/// finite, or too large to represent.
pub fn millis_to_duration(ms: f64) -> SimulationResult<Duration> {
    let nanos = (ms * NANOS_PER_MILLI).round();
    if !nanos.is_finite() || nanos < 0.0 || nanos >= u64::MAX as f64 {
        return Err(SimulationError::InvalidDelay(ms));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Convert simulation time into fractional milliseconds.
pub fn duration_to_millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / NANOS_PER_MILLI
}
