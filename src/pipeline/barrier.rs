//! One-shot counted rendezvous for a single evaluation run.
//!
//! Every node arrives exactly once, after it has registered all of its
//! subscriptions, and then waits until the last node has arrived. Once open,
//! "every node has subscribed" happens-before anything that follows any
//! node's wait, so no publish can race ahead of a registration.
//!
//! Waiting is only possible through the [`Arrival`] token returned by
//! [`Barrier::arrive`]: a node cannot wait without having arrived.

use crate::error::{Result, WireError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Closed,
    Open,
    Aborted,
}

/// Countdown barrier sized to the number of nodes in a run. Not reusable.
#[derive(Debug)]
pub struct Barrier {
    total: usize,
    remaining: AtomicUsize,
    gate: Mutex<Gate>,
    released: Condvar,
}

impl Barrier {
    /// A barrier that opens on the `count`-th arrival. A zero-sized barrier
    /// starts open.
    pub fn new(count: usize) -> Self {
        let gate = if count == 0 { Gate::Open } else { Gate::Closed };
        Self {
            total: count,
            remaining: AtomicUsize::new(count),
            gate: Mutex::new(gate),
            released: Condvar::new(),
        }
    }

    /// Record one arrival. The arrival that brings the count to zero opens
    /// the barrier for everyone.
    pub fn arrive(&self) -> Result<Arrival<'_>> {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| WireError::BarrierOverrun(self.total))?;

        if previous == 1 {
            tracing::trace!("Barrier open after {} arrivals", self.total);
            self.settle(Gate::Open);
        }
        Ok(Arrival { barrier: self })
    }

    /// Release every current and future waiter with
    /// [`WireError::BarrierAborted`]. No effect once the barrier is open.
    pub fn abort(&self) {
        if self.settle(Gate::Aborted) {
            tracing::debug!(
                "Barrier aborted with {} of {} arrivals outstanding",
                self.remaining(),
                self.total
            );
        }
    }

    /// Arrivals still missing
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether the barrier has opened (not merely been aborted)
    pub fn is_released(&self) -> bool {
        *self.lock() == Gate::Open
    }

    fn settle(&self, outcome: Gate) -> bool {
        let mut gate = self.lock();
        if *gate != Gate::Closed {
            return false;
        }
        *gate = outcome;
        self.released.notify_all();
        true
    }

    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outcome(&self, gate: Gate) -> Result<()> {
        match gate {
            Gate::Open => Ok(()),
            Gate::Aborted | Gate::Closed => Err(WireError::BarrierAborted {
                remaining: self.remaining(),
                total: self.total,
            }),
        }
    }
}

/// Proof that the holder has arrived; the only way to wait on the barrier.
#[must_use = "an arrival does nothing until it is waited on"]
#[derive(Debug)]
pub struct Arrival<'a> {
    barrier: &'a Barrier,
}

impl Arrival<'_> {
    /// Block until the barrier opens or is aborted.
    pub fn wait(self) -> Result<()> {
        let gate = self.barrier.lock();
        let gate = self
            .barrier
            .released
            .wait_while(gate, |g| *g == Gate::Closed)
            .unwrap_or_else(PoisonError::into_inner);
        self.barrier.outcome(*gate)
    }

    /// Block until the barrier opens, is aborted, or `timeout` elapses.
    pub fn wait_timeout(self, timeout: Duration) -> Result<()> {
        let gate = self.barrier.lock();
        let (gate, result) = self
            .barrier
            .released
            .wait_timeout_while(gate, timeout, |g| *g == Gate::Closed)
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() && *gate == Gate::Closed {
            return Err(WireError::Timeout(format!(
                "barrier still waiting on {} of {} arrivals",
                self.barrier.remaining(),
                self.barrier.total
            )));
        }
        self.barrier.outcome(*gate)
    }
}
