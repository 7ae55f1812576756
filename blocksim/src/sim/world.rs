//! The simulation environment: virtual clock, wake-up queue and process table.

use std::{
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
    time::Duration,
};
use tracing::instrument;

use crate::error::{SimulationError, SimulationResult};

use super::{
    events::{Event, EventQueue, ResumeToken, ScheduledEvent},
    rng::SimRng,
    sleep::Timeout,
    time::{duration_to_millis, millis_to_duration},
    wakers::{ResumeRegistry, noop_waker},
};

/// Identifier of a process spawned on an [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub usize);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process-{}", self.0)
    }
}

type ProcessFuture = Pin<Box<dyn Future<Output = SimulationResult<()>>>>;

struct ProcessSlot {
    name: String,
    /// `None` while the process is being polled, and once it has finished.
    future: Option<ProcessFuture>,
    finished: bool,
}

impl fmt::Debug for ProcessSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSlot")
            .field("name", &self.name)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Counters describing a finished (or halted) run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    /// Simulated time when the environment stopped.
    pub simulated_time: Duration,
    /// Number of wake-ups processed.
    pub events_processed: u64,
    /// Processes still suspended when the run stopped.
    pub live_processes: usize,
}

#[derive(Debug)]
pub(crate) struct EnvInner {
    pub(crate) current_time: Duration,
    pub(crate) event_queue: EventQueue,
    pub(crate) next_sequence: u64,
    pub(crate) next_token: u64,
    pub(crate) resumes: ResumeRegistry,
    pub(crate) current_process: Option<ProcessId>,
    pub(crate) rng: SimRng,
    pub(crate) events_processed: u64,
    pub(crate) event_budget: Option<u64>,
    processes: Vec<ProcessSlot>,
}

impl EnvInner {
    fn new(seed: u64) -> Self {
        Self {
            current_time: Duration::ZERO,
            event_queue: EventQueue::new(),
            next_sequence: 0,
            next_token: 0,
            resumes: ResumeRegistry::default(),
            current_process: None,
            rng: SimRng::new(seed),
            events_processed: 0,
            event_budget: None,
            processes: Vec::new(),
        }
    }

    fn schedule_at(&mut self, time: Duration, event: Event) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.event_queue
            .schedule(ScheduledEvent::new(time, event, sequence));
    }

    fn new_token(&mut self) -> ResumeToken {
        let token = ResumeToken(self.next_token);
        self.next_token += 1;
        token
    }
}

/// The virtual-time scheduler.
///
/// `Environment` owns simulated time, a queue of pending wake-ups ordered by
/// `(time, insertion sequence)`, the run-scoped random generator and the set
/// of processes. Processes are plain futures; they suspend through
/// [`Environment::timeout`] or a [`Store`](crate::store::Store) get and are
/// resumed only when their wake-up is popped from the queue, so at equal
/// timestamps processes resume in the order their wake-ups were registered.
///
/// The handle is cheap to clone internally; processes hold a
/// [`WeakEnvironment`] so the process table does not keep itself alive.
#[derive(Debug)]
pub struct Environment {
    pub(crate) inner: Rc<RefCell<EnvInner>>,
}

impl Environment {
    /// Creates an environment seeded with 0.
    pub fn new() -> Self {
        Self::new_with_seed(0)
    }

    /// Creates an environment whose random generator is seeded with `seed`.
    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EnvInner::new(seed))),
        }
    }

    /// Caps the number of wake-ups a run may process.
    pub fn with_event_budget(self, max_events: u64) -> Self {
        self.inner.borrow_mut().event_budget = Some(max_events);
        self
    }

    /// Returns the current simulation time.
    pub fn now(&self) -> Duration {
        self.inner.borrow().current_time
    }

    /// Returns the current simulation time in milliseconds.
    pub fn now_millis(&self) -> f64 {
        duration_to_millis(self.now())
    }

    /// Schedules `event` to fire `delay` after the current time.
    #[instrument(skip(self))]
    pub fn schedule(&self, event: Event, delay: Duration) {
        let mut inner = self.inner.borrow_mut();
        let time = inner.current_time + delay;
        inner.schedule_at(time, event);
    }

    /// Schedules `event` to fire `delay_ms` milliseconds after the current time.
    ///
    /// Negative or non-finite delays fail with [`SimulationError::InvalidDelay`].
    pub fn schedule_millis(&self, event: Event, delay_ms: f64) -> SimulationResult<()> {
        let delay = millis_to_duration(delay_ms)?;
        self.schedule(event, delay);
        Ok(())
    }

    /// Returns a future that completes once simulated time has advanced by `delay`.
    ///
    /// The wake-up is registered immediately, so its position among
    /// same-time wake-ups is fixed at the call, not at the first poll.
    pub fn timeout(&self, delay: Duration) -> Timeout {
        let token = self.inner.borrow_mut().new_token();
        self.schedule(Event::Wake { token }, delay);
        Timeout::new(self.downgrade(), token)
    }

    /// Millisecond flavour of [`Environment::timeout`].
    pub fn timeout_millis(&self, delay_ms: f64) -> SimulationResult<Timeout> {
        Ok(self.timeout(millis_to_duration(delay_ms)?))
    }

    /// Spawns a process. Its first poll happens at the current time, after
    /// every wake-up already registered for that instant.
    pub fn process<F>(&self, name: impl Into<String>, future: F) -> ProcessId
    where
        F: Future<Output = SimulationResult<()>> + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let pid = ProcessId(inner.processes.len());
        inner.processes.push(ProcessSlot {
            name: name.into(),
            future: Some(Box::pin(future)),
            finished: false,
        });
        let token = inner.new_token();
        inner.resumes.waiting.insert(token, pid);
        let now = inner.current_time;
        inner.schedule_at(now, Event::Wake { token });
        pid
    }

    /// Processes the next wake-up and resumes the process waiting on it.
    ///
    /// Returns `Ok(true)` if more wake-ups are pending afterwards. A process
    /// that finishes with an error aborts the run with that error.
    pub fn step(&self) -> SimulationResult<bool> {
        let resumed = {
            let mut inner = self.inner.borrow_mut();
            if let Some(budget) = inner.event_budget {
                if inner.events_processed >= budget && !inner.event_queue.is_empty() {
                    return Err(SimulationError::EventBudgetExhausted(inner.events_processed));
                }
            }
            let Some(scheduled) = inner.event_queue.pop_earliest() else {
                return Ok(false);
            };
            if scheduled.time() < inner.current_time {
                return Err(SimulationError::InvalidState(format!(
                    "wake-up at {:?} precedes current time {:?}",
                    scheduled.time(),
                    inner.current_time
                )));
            }
            inner.current_time = scheduled.time();
            inner.events_processed += 1;
            Self::process_event_with_inner(&mut inner, scheduled.into_event())
        };

        if let Some(pid) = resumed {
            self.resume(pid)?;
        }
        Ok(self.has_pending_events())
    }

    /// Runs until the queue is empty or the next wake-up lies beyond `until`.
    ///
    /// Wake-ups at exactly `until` are still processed. On return the clock
    /// reads `until` (it never moves backwards) and every process that is
    /// still suspended is left where it is.
    #[instrument(skip(self), fields(until_ms = duration_to_millis(until)))]
    pub fn run(&self, until: Duration) -> SimulationResult<RunStats> {
        loop {
            let next = self
                .inner
                .borrow()
                .event_queue
                .peek_earliest()
                .map(ScheduledEvent::time);
            match next {
                Some(time) if time <= until => {
                    self.step()?;
                }
                Some(time) => {
                    tracing::debug!(
                        next_ms = duration_to_millis(time),
                        "Halting: next wake-up is past the run bound"
                    );
                    break;
                }
                None => {
                    tracing::debug!("Halting: no pending wake-ups");
                    break;
                }
            }
        }

        {
            let mut inner = self.inner.borrow_mut();
            if inner.current_time < until {
                inner.current_time = until;
            }
        }
        Ok(self.stats())
    }

    /// Snapshot of the run counters.
    pub fn stats(&self) -> RunStats {
        let inner = self.inner.borrow();
        RunStats {
            simulated_time: inner.current_time,
            events_processed: inner.events_processed,
            live_processes: inner.processes.iter().filter(|p| !p.finished).count(),
        }
    }

    /// Runs `f` with the run-scoped random generator.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut SimRng) -> R) -> R {
        f(&mut self.inner.borrow_mut().rng)
    }

    /// Creates a weak reference to this environment.
    pub fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if there are wake-ups waiting to be processed.
    pub fn has_pending_events(&self) -> bool {
        !self.inner.borrow().event_queue.is_empty()
    }

    /// Returns the number of wake-ups waiting to be processed.
    pub fn pending_event_count(&self) -> usize {
        self.inner.borrow().event_queue.len()
    }

    /// Draws a fresh resume token.
    pub(crate) fn new_token(&self) -> ResumeToken {
        self.inner.borrow_mut().new_token()
    }

    /// Records that the process currently being polled is suspended on `token`.
    ///
    /// Outside of a process poll this is a no-op; the token is still marked
    /// as fired when its wake-up is processed.
    pub(crate) fn register_resume(&self, token: ResumeToken) {
        let mut inner = self.inner.borrow_mut();
        if let Some(pid) = inner.current_process {
            inner.resumes.waiting.insert(token, pid);
        }
    }

    /// Consumes the fired flag of `token`, returning whether it had fired.
    pub(crate) fn take_awakened(&self, token: ResumeToken) -> bool {
        self.inner.borrow_mut().resumes.take_awakened(token)
    }

    fn process_event_with_inner(inner: &mut EnvInner, event: Event) -> Option<ProcessId> {
        match event {
            Event::Wake { token } => {
                let pid = inner.resumes.fire(token);
                tracing::trace!(
                    token = token.0,
                    time_ms = duration_to_millis(inner.current_time),
                    process = ?pid,
                    "Wake-up"
                );
                pid
            }
        }
    }

    fn resume(&self, pid: ProcessId) -> SimulationResult<()> {
        let future = {
            let mut inner = self.inner.borrow_mut();
            let slot = inner
                .processes
                .get_mut(pid.0)
                .ok_or_else(|| SimulationError::InvalidState(format!("unknown {pid}")))?;
            slot.future.take()
        };
        // A stale token for a finished process
        let Some(mut future) = future else {
            return Ok(());
        };

        self.inner.borrow_mut().current_process = Some(pid);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let poll = future.as_mut().poll(&mut cx);

        let mut inner = self.inner.borrow_mut();
        inner.current_process = None;
        let slot = &mut inner.processes[pid.0];
        match poll {
            Poll::Pending => {
                slot.future = Some(future);
                Ok(())
            }
            Poll::Ready(Ok(())) => {
                slot.finished = true;
                tracing::trace!(process = %slot.name, "Process finished");
                Ok(())
            }
            Poll::Ready(Err(err)) => {
                slot.finished = true;
                tracing::error!(process = %slot.name, error = %err, "Process failed");
                Err(err)
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// A weak reference to an environment.
///
/// Processes, stores and futures hold this handle; once the environment is
/// dropped every call fails with [`SimulationError::SimulationShutdown`].
#[derive(Debug, Clone)]
pub struct WeakEnvironment {
    pub(crate) inner: Weak<RefCell<EnvInner>>,
}

/// Generates WeakEnvironment forwarding methods that wrap Environment results.
macro_rules! weak_forward {
    // For methods returning T that need Ok() wrapping
    (wrap $(#[$meta:meta])* $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty) => {
        $(#[$meta])*
        pub fn $method(&self $(, $arg: $arg_ty)*) -> SimulationResult<$ret> {
            Ok(self.upgrade()?.$method($($arg),*))
        }
    };
    // For methods already returning SimulationResult
    (pass $(#[$meta:meta])* $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty) => {
        $(#[$meta])*
        pub fn $method(&self $(, $arg: $arg_ty)*) -> SimulationResult<$ret> {
            self.upgrade()?.$method($($arg),*)
        }
    };
}

impl WeakEnvironment {
    /// Attempts to upgrade this weak reference to a strong reference.
    pub fn upgrade(&self) -> SimulationResult<Environment> {
        self.inner
            .upgrade()
            .map(|inner| Environment { inner })
            .ok_or(SimulationError::SimulationShutdown)
    }

    weak_forward!(wrap #[doc = "Returns the current simulation time."] now(&self) -> Duration);
    weak_forward!(
        wrap #[doc = "Returns the current simulation time in milliseconds."]
        now_millis(&self) -> f64
    );
    weak_forward!(
        wrap #[doc = "Sleeps for `delay` of simulation time."]
        timeout(&self, delay: Duration) -> Timeout
    );
    weak_forward!(
        pass #[doc = "Sleeps for `delay_ms` milliseconds of simulation time."]
        timeout_millis(&self, delay_ms: f64) -> Timeout
    );

    /// Runs `f` with the run-scoped random generator.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut SimRng) -> R) -> SimulationResult<R> {
        Ok(self.upgrade()?.with_rng(f))
    }
}
