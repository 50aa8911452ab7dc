/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The pending-call registry.
//!
//! [`PendingCalls`] is the only shared mutable structure on the call path.
//! Every resolution goes through [`complete`](PendingCalls::complete) or
//! [`fail`](PendingCalls::fail): both *remove* the record from the map under
//! the registry lock before resolving it, so at most one resolver can ever
//! obtain the record.  The loser of a race sees `false`.
//!
//! [`close`](PendingCalls::close) drains the map and refuses later
//! registrations under the same lock, so a call is either failed by the
//! close or never registered at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::debug;

use super::{CallId, CallRecord, CallState};
use crate::error::RpcError;
use crate::script::Value;
use crate::timeout::Deadline;

#[derive(Debug, Default)]
struct Slots {
    calls: HashMap<CallId, Arc<CallRecord>>,
    closed: bool,
}

/// Registry of calls that have been dispatched but not yet resolved.
#[derive(Debug, Default)]
pub struct PendingCalls {
    next_id: AtomicU64,
    slots: Mutex<Slots>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh call identifier.  Identifiers start at `1`.
    pub fn next_call_id(&self) -> CallId {
        CallId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Track a new pending call and return its record.
    ///
    /// Returns `None` once the registry has been [closed](Self::close).
    pub fn register(&self, id: CallId, deadline: Deadline) -> Option<Arc<CallRecord>> {
        let mut slots = self.lock_slots();
        if slots.closed {
            return None;
        }
        let record = Arc::new(CallRecord::new(id, deadline));
        let previous = slots.calls.insert(id, Arc::clone(&record));
        debug_assert!(previous.is_none(), "call id {id} registered twice");
        Some(record)
    }

    /// Fulfil call `id` with `value`.
    ///
    /// Returns `false` if the call is unknown or already resolved, e.g. a
    /// reply arriving after the watchdog timed the call out.
    pub fn complete(&self, id: CallId, value: Value) -> bool {
        self.resolve(id, CallState::Fulfilled(value))
    }

    /// Fail call `id` with `error`.  A [`RpcError::Timeout`] moves the record
    /// to `TimedOut`, anything else to `Failed`.
    ///
    /// Returns `false` if the call is unknown or already resolved.
    pub fn fail(&self, id: CallId, error: RpcError) -> bool {
        let next = if error.is_timeout() {
            CallState::TimedOut(error)
        } else {
            CallState::Failed(error)
        };
        self.resolve(id, next)
    }

    /// Identifiers of all pending calls whose deadline is `<= now`, in
    /// ascending order.
    pub fn snapshot_expired(&self, now: Instant) -> Vec<CallId> {
        let mut expired: Vec<CallId> = self
            .lock_slots()
            .calls
            .values()
            .filter(|r| r.deadline().is_expired(now) && !r.is_terminal())
            .map(|r| r.id())
            .collect();
        expired.sort_unstable();
        expired
    }

    /// Look up a pending record.
    pub fn get(&self, id: CallId) -> Option<Arc<CallRecord>> {
        self.lock_slots().calls.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_slots().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_slots().calls.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_slots().closed
    }

    /// Refuse further registrations and fail every pending call with the
    /// error built by `make_error`.  Returns how many calls were failed.
    ///
    /// Idempotent: a second close fails nothing.
    pub fn close(&self, make_error: impl Fn(CallId) -> RpcError) -> usize {
        let drained: Vec<Arc<CallRecord>> = {
            let mut slots = self.lock_slots();
            slots.closed = true;
            slots.calls.drain().map(|(_, r)| r).collect()
        };
        drained
            .into_iter()
            .filter(|r| r.resolve(CallState::Failed(make_error(r.id()))))
            .count()
    }

    fn resolve(&self, id: CallId, next: CallState) -> bool {
        // Remove under the lock: whoever gets the record is the only resolver.
        let record = self.lock_slots().calls.remove(&id);
        match record {
            Some(record) => record.resolve(next),
            None => {
                debug!(call_id = %id, outcome = next.name(), "Call already resolved, dropping outcome");
                false
            }
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
