//! Timeout future for simulation time.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::error::SimulationResult;

use super::{events::ResumeToken, world::WeakEnvironment};

/// Future that completes when its wake-up is processed by the environment.
///
/// Created by [`Environment::timeout`](super::Environment::timeout).
#[derive(Debug)]
pub struct Timeout {
    env: WeakEnvironment,
    token: ResumeToken,
    completed: bool,
}

impl Timeout {
    pub(crate) fn new(env: WeakEnvironment, token: ResumeToken) -> Self {
        Self {
            env,
            token,
            completed: false,
        }
    }
}

impl Future for Timeout {
    type Output = SimulationResult<()>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.completed {
            return Poll::Ready(Ok(()));
        }

        let env = match self.env.upgrade() {
            Ok(env) => env,
            Err(e) => return Poll::Ready(Err(e)),
        };

        if env.take_awakened(self.token) {
            self.completed = true;
            Poll::Ready(Ok(()))
        } else {
            env.register_resume(self.token);
            Poll::Pending
        }
    }
}
