/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! rpc-deadline – deadline-bounded asynchronous RPC futures
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── timeout.rs      – effective timeout, Deadline, process-wide default
//! ├── call/           – CallRecord state machine + pending-call registry
//! ├── future.rs       – caller-side RpcFuture
//! ├── watchdog.rs     – periodic deadline scan
//! ├── agent/          – dispatcher + serving side of one worker
//! ├── error.rs        – RpcError taxonomy
//! ├── transport/      – Transport trait, local network, fault injection
//! ├── script/         – compiled functions, values, builtins
//! ├── config/         – YAML world / fault configuration
//! └── world.rs        – in-process worker set
//! ```

pub mod agent;
pub mod call;
pub mod config;
pub mod error;
pub mod future;
pub mod script;
pub mod timeout;
pub mod transport;
pub mod watchdog;
pub mod world;

pub use agent::{AgentOptions, RpcAgent};
pub use error::RpcError;
pub use future::{CallStatus, RpcFuture};
pub use timeout::{DefaultTimeout, DEFAULT_RPC_TIMEOUT_SEC};
pub use world::World;
