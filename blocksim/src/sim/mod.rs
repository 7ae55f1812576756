//! Discrete-event kernel: virtual clock, wake-up queue and processes.

mod events;
mod rng;
mod sleep;
mod time;
mod wakers;
mod world;

pub use events::{Event, EventQueue, ResumeToken, ScheduledEvent};
pub use rng::SimRng;
pub use sleep::Timeout;
pub use time::{duration_to_millis, millis_to_duration};
pub use world::{Environment, ProcessId, RunStats, WeakEnvironment};
