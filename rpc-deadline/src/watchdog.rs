/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deadline watchdog.
//!
//! A background tokio task that scans the [`PendingCalls`] registry every
//! `scan_interval` and fails each call whose deadline has passed with
//! [`RpcError::Timeout`].  It runs independently of transport activity, so a
//! call whose message is stuck in the network still times out.
//!
//! # Timing guarantee
//! A call with deadline `d` is timed out no earlier than `d` and no later
//! than roughly `d + scan_interval` (plus scheduler latency).  The scan
//! interval is the configurable slack; millisecond granularity is enough for
//! RPC deadlines, which are typically hundreds of milliseconds or more.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::call::PendingCalls;
use crate::error::RpcError;

/// Default scan interval (the watchdog slack).
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(10);

/// Smallest accepted scan interval; shorter requests are raised to it.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running watchdog.
///
/// The scan loop runs under a supervisor task.  If the loop dies (panic or
/// cancellation) the supervisor closes the registry, failing every pending
/// call with [`RpcError::Shutdown`], since no deadline can be honoured any
/// more.
#[derive(Debug)]
pub struct Watchdog {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Start scanning `registry` every `scan_interval` on `runtime`.
    ///
    /// `worker` names the owning agent in errors and logs.
    pub fn spawn(
        registry: Arc<PendingCalls>,
        scan_interval: Duration,
        worker: impl Into<String>,
        runtime: &Handle,
    ) -> Self {
        let worker = worker.into();
        let scan_interval = if scan_interval < MIN_SCAN_INTERVAL {
            warn!(
                worker = %worker,
                requested_ms = scan_interval.as_millis() as u64,
                "Watchdog scan interval too small, using {} ms",
                MIN_SCAN_INTERVAL.as_millis()
            );
            MIN_SCAN_INTERVAL
        } else {
            scan_interval
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let scan = runtime.spawn(run(Arc::clone(&registry), scan_interval, stop_rx));
        let task = runtime.spawn(supervise(scan, registry, worker));
        Self {
            stop: Some(stop_tx),
            task,
        }
    }

    /// `false` once the watchdog has exited, whether by shutdown or by fault.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            // Err only if the task already exited.
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("Deadline watchdog supervisor terminated abnormally: {}", e);
        }
    }
}

/// Wait for the scan loop; on abnormal exit fail everything it was guarding.
async fn supervise(scan: JoinHandle<()>, registry: Arc<PendingCalls>, worker: String) {
    let Err(e) = scan.await else {
        return;
    };
    error!(worker = %worker, "Deadline watchdog terminated abnormally: {}", e);
    let failed = registry.close(|_| RpcError::Shutdown {
        worker: worker.clone(),
    });
    error!(worker = %worker, failed, "Failed pending calls after watchdog loss");
}

async fn run(registry: Arc<PendingCalls>, scan_interval: Duration, mut stop: oneshot::Receiver<()>) {
    debug!(scan_interval_ms = scan_interval.as_millis() as u64, "Deadline watchdog started");

    let mut ticker = tokio::time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                expire_pending(&registry, Instant::now());
            }
        }
    }

    debug!("Deadline watchdog stopped");
}

/// Fail every call in `registry` whose deadline is `<= now`.
///
/// Returns the number of calls this scan timed out.  A call that completes
/// concurrently with the scan is left to whichever resolver reached the
/// registry first.
pub fn expire_pending(registry: &PendingCalls, now: Instant) -> usize {
    let mut expired = 0;

    for id in registry.snapshot_expired(now) {
        let Some(record) = registry.get(id) else {
            continue;
        };
        let timeout = record.deadline().timeout().unwrap_or_default();
        let elapsed = record.elapsed_at(now);

        let error = RpcError::Timeout {
            call_id: id,
            timeout,
            elapsed,
        };
        if registry.fail(id, error) {
            warn!(
                call_id = %id,
                timeout_ms = timeout.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
                "RPC call timed out"
            );
            expired += 1;
        }
    }

    expired
}

// ── Tests ─────────────────────────────────────────────────────────────────────
