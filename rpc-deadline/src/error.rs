/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types surfaced by RPC futures.
//!
//! [`RpcError`] is the single terminal failure type a caller can observe from
//! [`RpcFuture::wait()`](crate::future::RpcFuture::wait) or from
//! [`RpcAgent::rpc_async()`](crate::agent::RpcAgent::rpc_async):
//!
//! | Variant | Produced by | Surfaced at |
//! |---|---|---|
//! | `InvalidArgument` | dispatcher (negative timeout, unknown worker) | `rpc_async()` |
//! | `Timeout` | deadline watchdog only | `wait()` / `poll()` |
//! | `RemoteExecution` | dispatcher relaying a remote or transport failure | `wait()` / `poll()` |
//! | `Shutdown` | agent shutdown with the call still pending | `wait()` / `rpc_async()` |
//!
//! A losing resolution race (a late network reply after a timeout, or the
//! reverse) is never an error: the registry reports it as `false` and the
//! payload is dropped.
//!
//! **Do not** collapse these into `anyhow::Error` on the call path; callers
//! match on the variants to tell a timeout apart from a remote failure.

use std::time::Duration;

use thiserror::Error;

use crate::call::CallId;

/// Substring present in every timeout message.
///
/// Callers that only see the rendered message (logs, foreign bindings) can
/// match on this marker; Rust callers should prefer [`RpcError::is_timeout`].
pub const TIMEOUT_ERROR_MARKER: &str = "RPC ran for more than set timeout";

/// Terminal failure of an RPC call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// The call could not be dispatched: negative or non-finite timeout,
    /// unknown destination worker, or malformed arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The deadline elapsed before the transport delivered a reply.
    ///
    /// Only the deadline watchdog produces this variant.
    #[error(
        "RPC ran for more than set timeout ({} ms) and will now be marked with an error \
         (call {call_id}, elapsed {} ms)",
        .timeout.as_millis(),
        .elapsed.as_millis()
    )]
    Timeout {
        call_id: CallId,
        timeout: Duration,
        elapsed: Duration,
    },

    /// The remote worker reported a failure unrelated to timing, or the
    /// transport refused to carry the request.
    #[error("remote execution failed on '{worker}': {message}")]
    RemoteExecution { worker: String, message: String },

    /// The local agent shut down while the call was pending (or before it
    /// could be dispatched).
    #[error("RPC agent '{worker}' has shut down")]
    Shutdown { worker: String },
}

impl RpcError {
    /// Returns `true` for [`RpcError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }

    /// Returns `true` for [`RpcError::RemoteExecution`].
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::RemoteExecution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_contains_marker_and_call_id() {
        let err = RpcError::Timeout {
            call_id: CallId::new(7),
            timeout: Duration::from_millis(500),
            elapsed: Duration::from_millis(512),
        };
        let msg = err.to_string();
        assert!(msg.contains(TIMEOUT_ERROR_MARKER), "got: {msg}");
        assert!(msg.contains("500 ms"));
        assert!(msg.contains("call 7"));
        assert!(err.is_timeout());
        assert!(!err.is_remote());
    }

    #[test]
    fn remote_error_is_not_a_timeout() {
        let err = RpcError::RemoteExecution {
            worker: "worker1".into(),
            message: "boom".into(),
        };
        assert!(!err.is_timeout());
        assert!(err.is_remote());
        assert!(!err.to_string().contains(TIMEOUT_ERROR_MARKER));
    }
}
