/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! RPC agent: the call dispatcher and the serving side of one worker.
//!
//! An [`RpcAgent`] owns the worker's pending-call registry, its deadline
//! watchdog, and an inbound loop consuming the worker's inbox:
//!
//! | Inbound message | Action |
//! |---|---|
//! | `ScriptCall` | run the function on a blocking thread, send `ScriptRet` / `Exception` back |
//! | `ScriptRet` | `PendingCalls::complete` |
//! | `Exception` | `PendingCalls::fail` with [`RpcError::RemoteExecution`] |
//!
//! [`rpc_async`](RpcAgent::rpc_async) never blocks and may be called from
//! async tasks and plain threads alike (including script function bodies
//! running on the blocking pool).
//!
//! # Example
//! ```rust,ignore
//! let fut = agent.rpc_async("worker1", &ScriptFunctionRef::new("two_args_two_kwargs"),
//!                           args, kwargs, Some(0.5))?;
//! match fut.wait().await {
//!     Err(e) if e.is_timeout() => warn!("slow worker: {e}"),
//!     other => { /* ... */ }
//! }
//! ```


use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::call::{CallId, PendingCalls};
use crate::error::RpcError;
use crate::future::RpcFuture;
use crate::script::{FunctionRegistry, ScriptContext, ScriptError, ScriptFunctionRef, Value};
use crate::timeout::{effective_timeout, Deadline, DefaultTimeout, DefaultTimeoutGuard};
use crate::transport::{Message, Payload, Transport, WorkerInfo};
use crate::watchdog::{Watchdog, DEFAULT_SCAN_INTERVAL};

// ── Options ───────────────────────────────────────────────────────────────────

/// Per-agent tuning.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Watchdog scan interval: the upper bound on how late past its
    /// deadline a call is timed out.
    pub watchdog_interval: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            watchdog_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

// ── RpcAgent ──────────────────────────────────────────────────────────────────

/// Clonable handle to one running worker.
#[derive(Clone)]
pub struct RpcAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    info: WorkerInfo,
    transport: Arc<dyn Transport>,
    functions: Arc<FunctionRegistry>,
    pending: Arc<PendingCalls>,
    default_timeout: Arc<DefaultTimeout>,
    runtime: Handle,
    watchdog: Mutex<Option<Watchdog>>,
    inbound: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
    shut_down: AtomicBool,
}

impl RpcAgent {
    /// Start serving `inbox` as worker `info`.
    ///
    /// `default_timeout` is shared process-wide; every agent of a world gets
    /// a clone of the same `Arc`.
    pub fn start(
        info: WorkerInfo,
        transport: Arc<dyn Transport>,
        inbox: mpsc::UnboundedReceiver<Message>,
        functions: Arc<FunctionRegistry>,
        default_timeout: Arc<DefaultTimeout>,
        options: AgentOptions,
        runtime: Handle,
    ) -> Self {
        let pending = Arc::new(PendingCalls::new());
        let watchdog = Watchdog::spawn(
            Arc::clone(&pending),
            options.watchdog_interval,
            info.name.clone(),
            &runtime,
        );

        let agent = RpcAgent {
            inner: Arc::new(AgentInner {
                info,
                transport,
                functions,
                pending,
                default_timeout,
                runtime: runtime.clone(),
                watchdog: Mutex::new(Some(watchdog)),
                inbound: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        // The loop holds a weak handle so dropping every `RpcAgent` ends it.
        let task = runtime.spawn(run_inbound(Arc::downgrade(&agent.inner), inbox, stop_rx));
        *agent
            .inner
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((stop_tx, task));

        info!(
            worker = %agent.inner.info.name,
            id = agent.inner.info.id,
            watchdog_interval_ms = options.watchdog_interval.as_millis() as u64,
            "RPC agent started"
        );
        agent
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.inner.info
    }

    pub fn name(&self) -> &str {
        &self.inner.info.name
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.inner.functions
    }

    /// Number of calls issued by this agent that are still unresolved.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    // ── Default timeout ───────────────────────────────────────────────────────

    pub fn get_default_timeout(&self) -> Duration {
        self.inner.default_timeout.get()
    }

    /// Change the process-wide default; affects calls dispatched afterwards.
    ///
    /// # Errors
    /// [`RpcError::InvalidArgument`] for negative or non-finite values.
    pub fn set_default_timeout(&self, secs: f64) -> Result<(), RpcError> {
        self.inner.default_timeout.set(secs)
    }

    /// Override the default until the guard is dropped.
    pub fn override_default_timeout(&self, secs: f64) -> Result<DefaultTimeoutGuard, RpcError> {
        self.inner.default_timeout.override_for(secs)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Invoke `function` on worker `to` and return a future for its result.
    ///
    /// `timeout` is in seconds: `None` uses the current default, `Some(0.0)`
    /// disables the deadline.
    ///
    /// # Errors
    /// * [`RpcError::InvalidArgument`]: negative timeout or unknown worker.
    /// * [`RpcError::Shutdown`]: the agent (or its watchdog) has stopped.
    ///
    /// Transport send failures are not returned here; they fail the future
    /// with [`RpcError::RemoteExecution`].
    pub fn rpc_async(
        &self,
        to: &str,
        function: &ScriptFunctionRef,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        timeout: Option<f64>,
    ) -> Result<RpcFuture, RpcError> {
        self.ensure_running()?;

        let timeout = effective_timeout(timeout, self.inner.default_timeout.get())?;
        let destination = self
            .inner
            .transport
            .resolve(to)
            .ok_or_else(|| RpcError::InvalidArgument(format!("unknown destination worker '{to}'")))?;

        let pending = &self.inner.pending;
        let id = pending.next_call_id();
        // Refused atomically once shutdown (or watchdog loss) closed the registry.
        let record = pending
            .register(id, Deadline::from_timeout(Instant::now(), timeout))
            .ok_or_else(|| self.shutdown_error())?;

        debug!(
            call_id = %id,
            to = %destination.name,
            function = %function,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Dispatching RPC"
        );

        let message = Message {
            id,
            from: self.inner.info.name.clone(),
            to: destination.name.clone(),
            payload: Payload::ScriptCall {
                function: function.clone(),
                args,
                kwargs,
            },
        };
        if let Err(e) = self.inner.transport.send(message) {
            warn!(call_id = %id, to = %destination.name, "Failed to send RPC: {}", e);
            pending.fail(
                id,
                RpcError::RemoteExecution {
                    worker: destination.name,
                    message: e.to_string(),
                },
            );
        }

        Ok(RpcFuture::new(record))
    }

    /// [`rpc_async`](Self::rpc_async) followed by [`RpcFuture::wait`].
    pub async fn rpc_sync(
        &self,
        to: &str,
        function: &ScriptFunctionRef,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        timeout: Option<f64>,
    ) -> Result<Value, RpcError> {
        self.rpc_async(to, function, args, kwargs, timeout)?
            .wait()
            .await
    }

    /// Run one of this worker's own functions, on the calling thread.
    ///
    /// The function body may block (e.g. waiting on a nested RPC), so call
    /// this from a blocking context such as `spawn_blocking`.
    pub fn run_script(
        &self,
        function: &ScriptFunctionRef,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value, ScriptError> {
        let ctx = ScriptContext::new(self.clone());
        self.inner.functions.invoke(&ctx, function, args, kwargs)
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Stop the inbound loop and the watchdog, fail every pending call with
    /// [`RpcError::Shutdown`], and restore the default timeout.
    ///
    /// A concurrent `rpc_async` either returns a future that fails with
    /// `Shutdown` or is refused with it.  Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let inbound = self
            .inner
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((stop, task)) = inbound {
            // Err only if the loop already exited.
            let _ = stop.send(());
            if let Err(e) = task.await {
                error!(worker = %self.name(), "Inbound loop terminated abnormally: {}", e);
            }
        }

        let watchdog = self
            .inner
            .watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watchdog) = watchdog {
            watchdog.shutdown().await;
        }

        let failed = self.inner.pending.close(|_| self.shutdown_error());
        self.inner.default_timeout.reset();

        info!(worker = %self.name(), failed_pending = failed, "RPC agent shut down");
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn shutdown_error(&self) -> RpcError {
        RpcError::Shutdown {
            worker: self.name().to_string(),
        }
    }

    fn ensure_running(&self) -> Result<(), RpcError> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(self.shutdown_error());
        }

        let watchdog_running = self
            .inner
            .watchdog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Watchdog::is_running);
        if !watchdog_running {
            // The watchdog supervisor has already failed the pending calls.
            error!(worker = %self.name(), "Deadline watchdog is not running, refusing to dispatch");
            return Err(self.shutdown_error());
        }
        Ok(())
    }

    fn handle_message(&self, message: Message) {
        let Message {
            id,
            from,
            to: _,
            payload,
        } = message;

        match payload {
            Payload::ScriptRet { value } => {
                if !self.inner.pending.complete(id, value) {
                    debug!(call_id = %id, from = %from, "Discarding late reply");
                }
            }
            Payload::Exception { message } => {
                let err = RpcError::RemoteExecution {
                    worker: from.clone(),
                    message,
                };
                if !self.inner.pending.fail(id, err) {
                    debug!(call_id = %id, from = %from, "Discarding late exception");
                }
            }
            Payload::ScriptCall {
                function,
                args,
                kwargs,
            } => self.serve(id, from, function, args, kwargs),
        }
    }

    /// Execute an inbound call on the blocking pool and reply to `caller`.
    fn serve(
        &self,
        id: CallId,
        caller: String,
        function: ScriptFunctionRef,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) {
        let agent = self.clone();
        self.inner.runtime.spawn_blocking(move || {
            let payload = match agent.run_script(&function, args, kwargs) {
                Ok(value) => Payload::ScriptRet { value },
                Err(e) => {
                    debug!(call_id = %id, function = %function, "Script function failed: {}", e);
                    Payload::Exception {
                        message: e.to_string(),
                    }
                }
            };
            let reply = Message {
                id,
                from: agent.name().to_string(),
                to: caller,
                payload,
            };
            if let Err(e) = agent.inner.transport.send(reply) {
                warn!(call_id = %id, "Failed to send reply: {}", e);
            }
        });
    }
}

impl fmt::Debug for RpcAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcAgent")
            .field("worker", &self.inner.info)
            .field("pending_calls", &self.inner.pending.len())
            .field("shut_down", &self.inner.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}

async fn run_inbound(
    agent: Weak<AgentInner>,
    mut inbox: mpsc::UnboundedReceiver<Message>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let message = tokio::select! {
            // Err when the agent was dropped without shutdown.
            _ = &mut stop => break,
            received = inbox.recv() => match received {
                Some(message) => message,
                None => break,
            },
        };
        let Some(inner) = agent.upgrade() else {
            break;
        };
        RpcAgent { inner }.handle_message(message);
    }
    debug!("Inbound loop stopped");
}
