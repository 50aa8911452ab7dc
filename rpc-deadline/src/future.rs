/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Caller-facing handle for the result of one RPC call.
//!
//! An [`RpcFuture`] is a cheap, clonable projection of a single
//! [`CallRecord`].  Its resolution does not depend on where it is awaited: a
//! future created inside a compiled script function can be returned out of
//! it and waited on by async code, another thread, or both, and every waiter
//! observes the same outcome.
//!
//! Dropping every clone does **not** cancel the remote call; the record stays
//! in the registry until the reply or the deadline resolves it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::call::{CallId, CallRecord};
use crate::error::RpcError;
use crate::script::Value;
use crate::timeout::Deadline;

/// Non-blocking view of a call's progress.
#[derive(Debug, Clone, PartialEq)]
pub enum CallStatus {
    Pending,
    Fulfilled(Value),
    Failed(RpcError),
}

impl CallStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, CallStatus::Pending)
    }

    fn from_outcome(outcome: Option<Result<Value, RpcError>>) -> Self {
        match outcome {
            None => CallStatus::Pending,
            Some(Ok(value)) => CallStatus::Fulfilled(value),
            Some(Err(err)) => CallStatus::Failed(err),
        }
    }
}

/// Handle to the eventual result of an RPC call.
#[derive(Clone)]
pub struct RpcFuture {
    record: Arc<CallRecord>,
}

impl RpcFuture {
    pub(crate) fn new(record: Arc<CallRecord>) -> Self {
        Self { record }
    }

    pub fn id(&self) -> CallId {
        self.record.id()
    }

    pub fn deadline(&self) -> Deadline {
        self.record.deadline()
    }

    /// `true` once the call has left the pending state.
    pub fn is_done(&self) -> bool {
        self.record.is_terminal()
    }

    /// Current status without waiting.
    pub fn poll(&self) -> CallStatus {
        CallStatus::from_outcome(self.record.outcome())
    }

    /// Wait for the call to finish and return its value.
    ///
    /// Idempotent: once resolved, every later call returns the same outcome
    /// immediately.
    ///
    /// # Errors
    /// The call's terminal error: [`RpcError::Timeout`] if the deadline
    /// elapsed, [`RpcError::RemoteExecution`] if the remote side failed.
    pub async fn wait(&self) -> Result<Value, RpcError> {
        self.record.wait().await
    }

    /// Like [`wait`](Self::wait), but gives up after the local `budget`.
    ///
    /// Running out of budget returns [`CallStatus::Pending`]; it does not
    /// fail the call.
    pub async fn wait_timeout(&self, budget: Duration) -> CallStatus {
        match tokio::time::timeout(budget, self.record.wait()).await {
            Ok(outcome) => CallStatus::from_outcome(Some(outcome)),
            Err(_) => self.poll(),
        }
    }

    /// Blocking form of [`wait`](Self::wait) for synchronous callers such as
    /// script function bodies.
    ///
    /// Must not be called from an async task: it parks the thread.
    pub fn wait_blocking(&self) -> Result<Value, RpcError> {
        self.record.wait_blocking()
    }

    /// Blocking form of [`wait_timeout`](Self::wait_timeout).
    pub fn wait_blocking_timeout(&self, budget: Duration) -> CallStatus {
        CallStatus::from_outcome(self.record.wait_blocking_timeout(budget))
    }

    /// `true` if both handles refer to the same call.
    pub fn same_call(&self, other: &RpcFuture) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl fmt::Debug for RpcFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcFuture")
            .field("id", &self.record.id())
            .field("state", &self.record.state().name())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
