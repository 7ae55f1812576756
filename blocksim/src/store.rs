//! Capacity-bounded FIFO queue with suspending removal.
//!
//! A [`Store`] never blocks a producer: [`Store::try_put`] either appends the
//! item or refuses it when the store is full (drop-on-full). Consumers call
//! [`Store::get`], which completes immediately when an item is available and
//! otherwise suspends the calling process until a put hands it one.
//!
//! An item handed to a suspended getter is *reserved*: it stays in the buffer
//! and counts against capacity until the getter actually resumes. The getter
//! is resumed through a zero-delay wake-up, so any work already queued for
//! the current instant runs first.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};

use crate::{
    error::{SimulationError, SimulationResult},
    sim::{Environment, Event, ResumeToken, WeakEnvironment},
};

struct StoreInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    /// Leading items promised to getters that have not resumed yet.
    reserved: usize,
    getters: VecDeque<ResumeToken>,
    accepted: u64,
    dropped: u64,
}

impl<T> StoreInner<T> {
    fn take_unreserved(&mut self) -> Option<T> {
        if self.items.len() > self.reserved {
            self.items.remove(self.reserved)
        } else {
            None
        }
    }
}

/// Shared handle to a bounded FIFO queue.
pub struct Store<T> {
    inner: Rc<RefCell<StoreInner<T>>>,
    env: WeakEnvironment,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            env: self.env.clone(),
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("len", &inner.items.len())
            .field("capacity", &inner.capacity)
            .field("reserved", &inner.reserved)
            .field("getters", &inner.getters.len())
            .finish()
    }
}

impl<T> Store<T> {
    /// Creates an empty store bound to `env`.
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                items: VecDeque::new(),
                capacity,
                reserved: 0,
                getters: VecDeque::new(),
                accepted: 0,
                dropped: 0,
            })),
            env: env.downgrade(),
        }
    }

    /// Appends `item` if the store has room.
    ///
    /// Returns `Ok(false)` when the store is full; the item is dropped.
    pub fn try_put(&self, item: T) -> SimulationResult<bool> {
        let handoff = {
            let mut inner = self.inner.borrow_mut();
            if inner.items.len() >= inner.capacity {
                inner.dropped += 1;
                return Ok(false);
            }
            inner.items.push_back(item);
            inner.accepted += 1;
            let waiter = inner.getters.pop_front();
            if waiter.is_some() {
                inner.reserved += 1;
            }
            waiter
        };

        if let Some(token) = handoff {
            self.env
                .upgrade()?
                .schedule(Event::Wake { token }, Duration::ZERO);
        }
        Ok(true)
    }

    /// Removes the next item, suspending until one is available.
    pub fn get(&self) -> GetFuture<T> {
        GetFuture {
            store: self.clone(),
            state: GetState::Start,
        }
    }

    /// Number of buffered items, reserved ones included.
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Maximum number of buffered items.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Items accepted by [`Store::try_put`] since creation.
    pub fn accepted(&self) -> u64 {
        self.inner.borrow().accepted
    }

    /// Items refused by [`Store::try_put`] since creation.
    pub fn dropped(&self) -> u64 {
        self.inner.borrow().dropped
    }
}

#[derive(Debug, Clone, Copy)]
enum GetState {
    Start,
    Waiting(ResumeToken),
    Done,
}

/// Future returned by [`Store::get`].
#[derive(Debug)]
pub struct GetFuture<T> {
    store: Store<T>,
    state: GetState,
}

impl<T> Future for GetFuture<T> {
    type Output = SimulationResult<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        // GetFuture holds no self-references
        let this = self.get_mut();
        let env = match this.store.env.upgrade() {
            Ok(env) => env,
            Err(e) => return Poll::Ready(Err(e)),
        };

        match this.state {
            GetState::Start => {
                let mut inner = this.store.inner.borrow_mut();
                if let Some(item) = inner.take_unreserved() {
                    this.state = GetState::Done;
                    return Poll::Ready(Ok(item));
                }
                let token = env.new_token();
                inner.getters.push_back(token);
                drop(inner);
                env.register_resume(token);
                this.state = GetState::Waiting(token);
                Poll::Pending
            }
            GetState::Waiting(token) => {
                if !env.take_awakened(token) {
                    env.register_resume(token);
                    return Poll::Pending;
                }
                let mut inner = this.store.inner.borrow_mut();
                let item = inner.items.pop_front().ok_or_else(|| {
                    SimulationError::InvalidState("reserved item missing from store".to_string())
                });
                inner.reserved = inner.reserved.saturating_sub(1);
                this.state = GetState::Done;
                Poll::Ready(item)
            }
            GetState::Done => Poll::Ready(Err(SimulationError::InvalidState(
                "store get polled after completion".to_string(),
            ))),
        }
    }
}
