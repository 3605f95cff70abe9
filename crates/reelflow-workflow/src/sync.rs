//! Blocking primitives shared by the workflows.
//!
//! Every wait in the engine goes through one of these two types, so each can
//! be bounded by a timeout and released by a cancellation.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    TimedOut,
    Cancelled,
}

struct Monitored<T> {
    value: T,
    epoch: u64,
}

/// A value guarded by a mutex, with waiters notified on every update.
///
/// `cancel` bumps an epoch; cancellable waits started before the bump
/// return [`WaitOutcome::Cancelled`].
pub struct StateMonitor<T> {
    inner: Mutex<Monitored<T>>,
    cond: Condvar,
}

impl<T> StateMonitor<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Monitored { value, epoch: 0 }),
            cond: Condvar::new(),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock().value)
    }

    /// Mutate the value and wake every waiter.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.lock().value);
        self.cond.notify_all();
        result
    }

    /// Current cancellation epoch.
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Block until `done` holds, the timeout expires, or `cancel` is called.
    pub fn wait_until(&self, done: impl FnMut(&T) -> bool, timeout: Option<Duration>) -> WaitOutcome {
        let guard = self.inner.lock();
        let epoch = guard.epoch;
        self.wait_locked(guard, epoch, done, timeout)
    }

    /// Like [`wait_until`](Self::wait_until), but cancellations since `epoch`
    /// count too.
    pub fn wait_until_from(
        &self,
        epoch: u64,
        done: impl FnMut(&T) -> bool,
        timeout: Option<Duration>,
    ) -> WaitOutcome {
        let guard = self.inner.lock();
        self.wait_locked(guard, epoch, done, timeout)
    }

    fn wait_locked(
        &self,
        mut guard: MutexGuard<'_, Monitored<T>>,
        epoch: u64,
        mut done: impl FnMut(&T) -> bool,
        timeout: Option<Duration>,
    ) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if done(&guard.value) {
                return WaitOutcome::Reached;
            }
            if guard.epoch != epoch {
                return WaitOutcome::Cancelled;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut guard, deadline).timed_out() {
                        return if done(&guard.value) {
                            WaitOutcome::Reached
                        } else if guard.epoch != epoch {
                            WaitOutcome::Cancelled
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
                None => self.cond.wait(&mut guard),
            }
        }
    }

    /// Block until `done` holds, then apply `f` under the same lock.
    ///
    /// Not affected by `cancel`: used by threads that must only resume on a
    /// real state change.
    pub fn wait_and_update<R>(&self, mut done: impl FnMut(&T) -> bool, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        while !done(&guard.value) {
            self.cond.wait(&mut guard);
        }
        let result = f(&mut guard.value);
        drop(guard);
        self.cond.notify_all();
        result
    }

    /// Release every cancellable wait currently blocked.
    pub fn cancel(&self) {
        self.inner.lock().epoch += 1;
        self.cond.notify_all();
    }
}

struct BarrierState {
    ticket: u64,
    pending: BTreeSet<usize>,
    cancelled: bool,
}

/// Waits for a set of tracks to report in for one round.
///
/// Each round gets a ticket. Arrivals carrying an older ticket are ignored,
/// so a late notification from an abandoned round cannot complete the
/// current one.
pub struct TrackBarrier {
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl Default for TrackBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackBarrier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BarrierState {
                ticket: 0,
                pending: BTreeSet::new(),
                cancelled: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Start a round expecting one arrival from each participant.
    pub fn begin(&self, participants: impl IntoIterator<Item = usize>) -> u64 {
        let mut state = self.state.lock();
        state.ticket += 1;
        state.pending = participants.into_iter().collect();
        state.cancelled = false;
        let ticket = state.ticket;
        drop(state);
        // Waiters on the previous round see it replaced.
        self.cond.notify_all();
        ticket
    }

    /// Record that `track` is done with round `ticket`.
    ///
    /// Returns false for stale tickets and repeated arrivals.
    pub fn arrive(&self, ticket: u64, track: usize) -> bool {
        let mut state = self.state.lock();
        if state.ticket != ticket || !state.pending.remove(&track) {
            return false;
        }
        let complete = state.pending.is_empty();
        drop(state);
        if complete {
            self.cond.notify_all();
        }
        true
    }

    pub fn is_complete(&self, ticket: u64) -> bool {
        let state = self.state.lock();
        state.ticket == ticket && state.pending.is_empty()
    }

    /// Whether round `ticket` was cancelled or replaced.
    pub fn is_cancelled(&self, ticket: u64) -> bool {
        let state = self.state.lock();
        state.cancelled || state.ticket != ticket
    }

    /// Tracks that still have to arrive in round `ticket`.
    pub fn remaining(&self, ticket: u64) -> Vec<usize> {
        let state = self.state.lock();
        if state.ticket == ticket {
            state.pending.iter().copied().collect()
        } else {
            Vec::new()
        }
    }

    /// Block until every participant of round `ticket` arrived.
    pub fn wait(&self, ticket: u64, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.cancelled || state.ticket != ticket {
                return WaitOutcome::Cancelled;
            }
            if state.pending.is_empty() {
                return WaitOutcome::Reached;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        return if state.ticket == ticket && !state.cancelled && state.pending.is_empty() {
                            WaitOutcome::Reached
                        } else if state.cancelled || state.ticket != ticket {
                            WaitOutcome::Cancelled
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Release every waiter of the current round. Stays in effect until the
    /// next `begin`.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.cond.notify_all();
    }
}
