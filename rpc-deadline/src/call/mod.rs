/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Call records and the pending-call registry.
//!
//! A [`CallRecord`] is the single source of truth for one dispatched call.
//! Three parties hold it: the [`PendingCalls`] registry (until the record is
//! resolved), the deadline watchdog (transiently, while it scans), and every
//! [`RpcFuture`](crate::future::RpcFuture) clone owned by the caller.
//!
//! # State machine
//! ```text
//!            complete()          ┌───────────┐
//!          ┌───────────────────► │ Fulfilled │
//!          │                     └───────────┘
//! ┌────────┴┐  fail(Timeout)     ┌───────────┐
//! │ Pending ├──────────────────► │ TimedOut  │
//! └────────┬┘                    └───────────┘
//!          │   fail(other)       ┌───────────┐
//!          └───────────────────► │  Failed   │
//!                                └───────────┘
//! ```
//! Terminal states are final.  The transition is a compare-and-set on the
//! record's state, so when the transport and the watchdog race, exactly one
//! of them wins.

pub mod registry;

pub use registry::PendingCalls;

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::error::RpcError;
use crate::script::Value;
use crate::timeout::Deadline;

// ── CallId ────────────────────────────────────────────────────────────────────

/// Opaque identifier correlating a dispatched call with its reply.
///
/// Unique per agent; assigned by [`PendingCalls::next_call_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    pub fn new(raw: u64) -> Self {
        CallId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── CallState ─────────────────────────────────────────────────────────────────

/// Lifecycle state of a call.  The payload lives with the state so a result
/// can only exist once the call is fulfilled, and an error only once it has
/// failed.
#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    Pending,
    Fulfilled(Value),
    TimedOut(RpcError),
    Failed(RpcError),
}

impl CallState {
    pub fn is_pending(&self) -> bool {
        matches!(self, CallState::Pending)
    }

    /// Short name used in logs and `Debug` output.
    pub fn name(&self) -> &'static str {
        match self {
            CallState::Pending => "pending",
            CallState::Fulfilled(_) => "fulfilled",
            CallState::TimedOut(_) => "timed_out",
            CallState::Failed(_) => "failed",
        }
    }

    /// The terminal outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<Value, RpcError>> {
        match self {
            CallState::Pending => None,
            CallState::Fulfilled(value) => Some(Ok(value.clone())),
            CallState::TimedOut(err) | CallState::Failed(err) => Some(Err(err.clone())),
        }
    }
}

// ── CallRecord ────────────────────────────────────────────────────────────────

/// One in-flight or completed call.
///
/// State is mutated only through [`resolve`](Self::resolve), which the
/// registry calls; callers observe it through the future.
pub struct CallRecord {
    id: CallId,
    deadline: Deadline,
    dispatched_at: Instant,
    state: Mutex<CallState>,
    /// Wakes threads parked in a blocking wait.
    resolved: Condvar,
    /// Wakes tasks parked in an async wait.
    notify: Notify,
}

impl CallRecord {
    pub(crate) fn new(id: CallId, deadline: Deadline) -> Self {
        // Measure elapsed time from the instant the deadline was computed.
        let dispatched_at = match deadline {
            Deadline::At { at, timeout } => at.checked_sub(timeout),
            Deadline::Never => None,
        }
        .unwrap_or_else(Instant::now);
        Self {
            id,
            deadline,
            dispatched_at,
            state: Mutex::new(CallState::Pending),
            resolved: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn dispatched_at(&self) -> Instant {
        self.dispatched_at
    }

    /// Time since dispatch, measured at `now`.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.dispatched_at)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CallState {
        self.lock_state().clone()
    }

    pub fn is_terminal(&self) -> bool {
        !self.lock_state().is_pending()
    }

    /// Move the record out of `Pending` into `next`.
    ///
    /// Returns `false` (and changes nothing) if the record was already
    /// terminal or `next` is itself `Pending`.
    pub(crate) fn resolve(&self, next: CallState) -> bool {
        if next.is_pending() {
            return false;
        }
        {
            let mut state = self.lock_state();
            if !state.is_pending() {
                return false;
            }
            *state = next;
        }
        self.resolved.notify_all();
        self.notify.notify_waiters();
        true
    }

    pub(crate) fn outcome(&self) -> Option<Result<Value, RpcError>> {
        self.lock_state().outcome()
    }

    /// Park the current thread until the record is terminal.
    pub(crate) fn wait_blocking(&self) -> Result<Value, RpcError> {
        let mut state = self.lock_state();
        loop {
            if let Some(outcome) = state.outcome() {
                return outcome;
            }
            state = self
                .resolved
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Park the current thread for at most `budget`.
    pub(crate) fn wait_blocking_timeout(&self, budget: Duration) -> Option<Result<Value, RpcError>> {
        let state = self.lock_state();
        let (state, _) = self
            .resolved
            .wait_timeout_while(state, budget, |s| s.is_pending())
            .unwrap_or_else(PoisonError::into_inner);
        state.outcome()
    }

    /// Suspend the current task until the record is terminal.
    pub(crate) async fn wait(&self) -> Result<Value, RpcError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a resolution between the
            // check and the await is not missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRecord")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("state", &self.lock_state().name())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use crate::script::Tensor;

    fn record() -> CallRecord {
        CallRecord::new(CallId::new(1), Deadline::Never)
    }

    #[test]
    fn new_record_is_pending() {
        let r = record();
        assert!(r.state().is_pending());
        assert!(!r.is_terminal());
        assert!(r.outcome().is_none());
    }

    #[test]
    fn first_resolution_wins_and_later_ones_are_ignored() {
        let r = record();
        assert!(r.resolve(CallState::Fulfilled(Value::Int(3))));
        assert!(!r.resolve(CallState::Failed(RpcError::InvalidArgument("late".into()))));
        assert_eq!(r.state(), CallState::Fulfilled(Value::Int(3)));
    }

    #[test]
    fn resolving_to_pending_is_rejected() {
        let r = record();
        assert!(!r.resolve(CallState::Pending));
        assert!(r.state().is_pending());
    }

    #[test]
    fn blocking_wait_returns_value_resolved_on_another_thread() {
        let r = Arc::new(record());
        let resolver = {
            let r = Arc::clone(&r);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                r.resolve(CallState::Fulfilled(Value::Tensor(Tensor::from([8, 8]))))
            })
        };
        let value = r.wait_blocking().unwrap();
        assert!(resolver.join().unwrap());
        assert_eq!(value, Value::Tensor(Tensor::from([8, 8])));
    }

    #[test]
    fn blocking_wait_with_budget_returns_none_while_pending() {
        let r = record();
        assert!(r.wait_blocking_timeout(Duration::from_millis(10)).is_none());
        assert!(r.state().is_pending(), "poll budget must not fail the call");
    }

    #[tokio::test]
    async fn async_wait_observes_resolution_from_another_task() {
        let r = Arc::new(record());
        let r2 = Arc::clone(&r);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            r2.resolve(CallState::Failed(RpcError::Shutdown {
                worker: "worker0".into(),
            }));
        });
        let err = r.wait().await.unwrap_err();
        assert!(matches!(err, RpcError::Shutdown { .. }));
    }
}
