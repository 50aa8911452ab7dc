/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Message transport between workers.
//!
//! The RPC core only needs two things from a transport: resolve a worker
//! name, and hand over a [`Message`] without blocking.  Replies come back as
//! ordinary messages on the caller's inbox; the agent's inbound loop is the
//! completion callback.
//!
//! ```text
//! caller agent ──ScriptCall──► Transport ──► callee inbox
//!      ▲                                         │ run function
//!      └──────── ScriptRet / Exception ◄─────────┘
//! ```
//!
//! Implementations:
//! * [`LocalNetwork`] – in-process routing over tokio channels.
//! * [`FaultyTransport`] – wraps another transport and delays or fails
//!   selected message types.

pub mod faulty;
pub mod local;

pub use faulty::{FaultPlan, FaultyTransport};
pub use local::LocalNetwork;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::call::CallId;
use crate::script::{ScriptFunctionRef, Value};

// ── Workers ───────────────────────────────────────────────────────────────────

/// Identity of one worker on the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerInfo {
    pub id: u32,
    pub name: String,
}

/// Canonical worker name for `rank`.
pub fn worker_name(rank: u32) -> String {
    format!("worker{rank}")
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Wire-level message category.  Fault injection is configured per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ScriptCall,
    ScriptRet,
    Exception,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ScriptCall => "SCRIPT_CALL",
            MessageType::ScriptRet => "SCRIPT_RET",
            MessageType::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCRIPT_CALL" => Ok(MessageType::ScriptCall),
            "SCRIPT_RET" => Ok(MessageType::ScriptRet),
            "EXCEPTION" => Ok(MessageType::Exception),
            other => Err(TransportError::UnknownMessageType(other.to_string())),
        }
    }
}

/// Message body.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Invoke a compiled function on the receiver.
    ScriptCall {
        function: ScriptFunctionRef,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    },
    /// Successful result of an earlier `ScriptCall`.
    ScriptRet { value: Value },
    /// The receiver failed to execute an earlier `ScriptCall`.
    Exception { message: String },
}

/// A routed message.  Replies carry the id of the call they answer.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: CallId,
    pub from: String,
    pub to: String,
    pub payload: Payload,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self.payload {
            Payload::ScriptCall { .. } => MessageType::ScriptCall,
            Payload::ScriptRet { .. } => MessageType::ScriptRet,
            Payload::Exception { .. } => MessageType::Exception,
        }
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Errors reported by a transport when it cannot accept a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unknown destination worker '{0}'")]
    UnknownWorker(String),

    #[error("a worker named '{0}' has already joined")]
    DuplicateWorker(String),

    #[error("worker '{0}' is no longer accepting messages")]
    Disconnected(String),

    #[error("injected send failure for {message_type} message to '{to}'")]
    InjectedFailure {
        message_type: MessageType,
        to: String,
    },

    #[error("unknown message type '{0}' (valid: SCRIPT_CALL, SCRIPT_RET, EXCEPTION)")]
    UnknownMessageType(String),
}

/// Delivers messages between workers.
///
/// `send` must not block; delivery may happen later (or never, if the
/// transport loses the message; the deadline watchdog covers that case).
pub trait Transport: Send + Sync + 'static {
    fn resolve(&self, name: &str) -> Option<WorkerInfo>;

    fn send(&self, message: Message) -> Result<(), TransportError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
