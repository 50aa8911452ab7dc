/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deadline policy: how a call's timeout is derived and turned into an
//! absolute deadline.
//!
//! ```text
//! explicit timeout ──┐
//!                    ├─► effective_timeout() ──► Option<Duration> ──► Deadline
//! DefaultTimeout ────┘        (0 ⇒ None)                (at dispatch time)
//! ```
//!
//! A timeout of exactly zero, whether passed explicitly or configured as the
//! process-wide default, means the call has no deadline and runs to
//! completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::RpcError;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default RPC timeout in seconds applied when nothing else is configured.
pub const DEFAULT_RPC_TIMEOUT_SEC: f64 = 60.0;

// ── Timeout resolution ────────────────────────────────────────────────────────

/// Convert a timeout expressed in seconds into a [`Duration`].
///
/// # Errors
/// [`RpcError::InvalidArgument`] for negative, NaN or infinite values.
pub fn timeout_from_secs(secs: f64) -> Result<Duration, RpcError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(RpcError::InvalidArgument(format!(
            "timeout must be a finite, non-negative number of seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Resolve the timeout a call will actually run under.
///
/// * `explicit == None` → `default`.
/// * A resolved timeout of zero → `None` (no deadline).
/// * Otherwise → `Some(timeout)`.
///
/// # Errors
/// [`RpcError::InvalidArgument`] if `explicit` is negative or non-finite.
pub fn effective_timeout(
    explicit: Option<f64>,
    default: Duration,
) -> Result<Option<Duration>, RpcError> {
    let timeout = match explicit {
        Some(secs) => timeout_from_secs(secs)?,
        None => default,
    };
    if timeout.is_zero() {
        Ok(None)
    } else {
        Ok(Some(timeout))
    }
}

// ── Deadline ──────────────────────────────────────────────────────────────────

/// Absolute deadline of one call, fixed at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// The call runs to completion however long the transport takes.
    Never,
    /// The call fails with a timeout once `at` has passed.
    At { at: Instant, timeout: Duration },
}

impl Deadline {
    /// Build the deadline for a call dispatched at `dispatched_at`.
    ///
    /// A timeout so large that `dispatched_at + timeout` is not representable
    /// degrades to [`Deadline::Never`].
    pub fn from_timeout(dispatched_at: Instant, timeout: Option<Duration>) -> Self {
        match timeout {
            None => Deadline::Never,
            Some(timeout) => match dispatched_at.checked_add(timeout) {
                Some(at) => Deadline::At { at, timeout },
                None => Deadline::Never,
            },
        }
    }

    /// `true` once `now` has reached the deadline. Never `true` before it.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::At { at, .. } => *at <= now,
        }
    }

    /// The absolute instant, if any.
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::Never => None,
            Deadline::At { at, .. } => Some(*at),
        }
    }

    /// The relative timeout this deadline was built from, if any.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Deadline::Never => None,
            Deadline::At { timeout, .. } => Some(*timeout),
        }
    }
}

// ── Process-wide default ──────────────────────────────────────────────────────

/// Process-wide default RPC timeout.
///
/// Shared (via `Arc`) by every agent and execution context of one process.
/// It is read once per dispatch, so changing it never affects calls that are
/// already pending.  [`reset`](Self::reset) restores the value the instance
/// was created with; agents call it on clean shutdown.
#[derive(Debug)]
pub struct DefaultTimeout {
    nanos: AtomicU64,
    initial: Duration,
}

impl DefaultTimeout {
    pub fn new(initial: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(duration_to_nanos(initial)),
            initial,
        }
    }

    /// Current default.
    pub fn get(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    /// Set the default from seconds; `0` means "no deadline".
    ///
    /// # Errors
    /// [`RpcError::InvalidArgument`] for negative or non-finite values.
    pub fn set(&self, secs: f64) -> Result<(), RpcError> {
        let timeout = timeout_from_secs(secs)?;
        self.set_duration(timeout);
        Ok(())
    }

    pub fn set_duration(&self, timeout: Duration) {
        debug!(timeout_ms = timeout.as_millis() as u64, "Default RPC timeout set");
        self.nanos
            .store(duration_to_nanos(timeout), Ordering::Release);
    }

    /// Restore the value this instance was created with.
    pub fn reset(&self) {
        self.set_duration(self.initial);
    }

    /// The value this instance was created with.
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Override the default until the returned guard is dropped.
    ///
    /// # Errors
    /// [`RpcError::InvalidArgument`] for negative or non-finite values; the
    /// default is left untouched in that case.
    pub fn override_for(self: &Arc<Self>, secs: f64) -> Result<DefaultTimeoutGuard, RpcError> {
        let timeout = timeout_from_secs(secs)?;
        let previous = self.get();
        self.set_duration(timeout);
        Ok(DefaultTimeoutGuard {
            target: Arc::clone(self),
            previous,
        })
    }
}

impl Default for DefaultTimeout {
    fn default() -> Self {
        Self::new(Duration::from_secs_f64(DEFAULT_RPC_TIMEOUT_SEC))
    }
}

/// Restores the previous default timeout when dropped.
#[derive(Debug)]
pub struct DefaultTimeoutGuard {
    target: Arc<DefaultTimeout>,
    previous: Duration,
}

impl Drop for DefaultTimeoutGuard {
    fn drop(&mut self) {
        self.target.set_duration(self.previous);
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
