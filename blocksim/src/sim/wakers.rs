//! Resume bookkeeping for suspended processes.
//!
//! The environment polls process futures with a no-op waker; a suspended
//! process is instead found again through the token it registered here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::task::{Wake, Waker};

use super::events::ResumeToken;
use super::world::ProcessId;

/// Maps outstanding resume tokens to the processes waiting on them.
#[derive(Debug, Default)]
pub(crate) struct ResumeRegistry {
    /// Process suspended on each token, if the token was polled inside a process.
    pub(crate) waiting: HashMap<ResumeToken, ProcessId>,
    /// Tokens whose wake-up has fired but which the suspended future has not yet observed.
    pub(crate) awakened: HashSet<ResumeToken>,
}

impl ResumeRegistry {
    /// Mark `token` as fired and return the process to resume, if any.
    pub(crate) fn fire(&mut self, token: ResumeToken) -> Option<ProcessId> {
        self.awakened.insert(token);
        self.waiting.remove(&token)
    }

    /// Consume the fired flag for `token`.
    pub(crate) fn take_awakened(&mut self, token: ResumeToken) -> bool {
        self.awakened.remove(&token)
    }
}

struct NoopWaker;

impl Wake for NoopWaker {
    fn wake(self: Arc<Self>) {}
}

/// Waker handed to process futures. Resumption is driven by the event queue, never by wakers.
pub(crate) fn noop_waker() -> Waker {
    Waker::from(Arc::new(NoopWaker))
}
