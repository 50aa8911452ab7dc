/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Statically compiled script functions, as seen by the RPC layer.
//!
//! The RPC core never inspects arguments or results; it carries [`Value`]s
//! and names functions through an opaque [`ScriptFunctionRef`].  This module
//! owns everything on the other side of that boundary:
//!
//! ```text
//! script/
//! ├── value.rs     – Value / Tensor payloads
//! ├── function.rs  – ScriptFunction schema, argument binding, FunctionRegistry
//! └── builtins.rs  – functions every worker registers
//! ```
//!
//! A function body receives a [`ScriptContext`].  Through it a compiled
//! function can issue its own `rpc_async`, wait on the future in place, or
//! return the future out as a [`Value::Future`] for the caller to wait on.

pub mod builtins;
pub mod function;
pub mod value;

pub use function::{BoundArgs, FunctionRegistry, Param, ScriptFunction, ScriptFunctionRef};
pub use value::{Tensor, Value};

use thiserror::Error;

use crate::agent::RpcAgent;
use crate::error::RpcError;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure raised while binding arguments to, or running, a script function.
///
/// On the serving side these are rendered into an exception reply and reach
/// the caller as [`RpcError::RemoteExecution`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("{function}() takes {expected} positional argument(s) but {given} were given")]
    TooManyArguments {
        function: String,
        expected: usize,
        given: usize,
    },

    #[error("{function}() got an unexpected keyword argument '{keyword}'")]
    UnexpectedKeyword { function: String, keyword: String },

    #[error("{function}() got multiple values for argument '{param}'")]
    DuplicateArgument { function: String, param: String },

    #[error("{function}() is missing a value for argument '{param}'")]
    MissingArgument { function: String, param: String },

    #[error("argument '{0}' is not part of the function schema")]
    UnboundArgument(String),

    #[error("expected a value of type '{expected}' but found '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("tensor shapes do not match: {left} vs {right}")]
    ShapeMismatch { left: usize, right: usize },

    #[error("unknown script function '{0}'")]
    UnknownFunction(String),

    #[error("script function needs an RPC agent but runs detached")]
    NoAgent,

    /// An RPC issued from inside the function failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl ScriptError {
    pub(crate) fn type_mismatch(expected: &'static str, found: &Value) -> Self {
        ScriptError::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }
}

// ── ScriptContext ─────────────────────────────────────────────────────────────

/// Execution context handed to every function body.
#[derive(Debug, Clone, Default)]
pub struct ScriptContext {
    agent: Option<RpcAgent>,
}

impl ScriptContext {
    /// Context bound to the agent the function runs on.
    pub fn new(agent: RpcAgent) -> Self {
        Self { agent: Some(agent) }
    }

    /// Context for pure functions that never issue RPCs.
    pub fn detached() -> Self {
        Self::default()
    }

    /// # Errors
    /// [`ScriptError::NoAgent`] for a detached context.
    pub fn agent(&self) -> Result<&RpcAgent, ScriptError> {
        self.agent.as_ref().ok_or(ScriptError::NoAgent)
    }
}
