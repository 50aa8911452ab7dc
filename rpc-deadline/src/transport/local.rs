/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-process transport: every worker owns an unbounded tokio channel and
//! the network routes messages by worker name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Message, Transport, TransportError, WorkerInfo};

struct Endpoint {
    info: WorkerInfo,
    inbox: mpsc::UnboundedSender<Message>,
}

/// In-process network connecting the workers of one process.
#[derive(Default)]
pub struct LocalNetwork {
    endpoints: Mutex<HashMap<String, Endpoint>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach worker `name` with id `id` and return its inbox.
    ///
    /// # Errors
    /// [`TransportError::DuplicateWorker`] if the name is taken.
    pub fn join(
        &self,
        id: u32,
        name: impl Into<String>,
    ) -> Result<(WorkerInfo, mpsc::UnboundedReceiver<Message>), TransportError> {
        let name = name.into();
        let mut endpoints = self.lock_endpoints();
        if endpoints.contains_key(&name) {
            return Err(TransportError::DuplicateWorker(name));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let info = WorkerInfo {
            id,
            name: name.clone(),
        };
        endpoints.insert(
            name,
            Endpoint {
                info: info.clone(),
                inbox: tx,
            },
        );
        info!(worker = %info.name, id = info.id, "Worker joined local network");
        Ok((info, rx))
    }

    /// Detach worker `name`.  Returns `false` if it was not attached.
    pub fn leave(&self, name: &str) -> bool {
        let removed = self.lock_endpoints().remove(name).is_some();
        if removed {
            info!(worker = %name, "Worker left local network");
        }
        removed
    }

    /// All attached workers, sorted by id.
    pub fn workers(&self) -> Vec<WorkerInfo> {
        let mut workers: Vec<WorkerInfo> = self
            .lock_endpoints()
            .values()
            .map(|e| e.info.clone())
            .collect();
        workers.sort_by_key(|w| w.id);
        workers
    }

    fn lock_endpoints(&self) -> MutexGuard<'_, HashMap<String, Endpoint>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("workers", &self.workers())
            .finish()
    }
}

impl Transport for LocalNetwork {
    fn resolve(&self, name: &str) -> Option<WorkerInfo> {
        self.lock_endpoints().get(name).map(|e| e.info.clone())
    }

    fn send(&self, message: Message) -> Result<(), TransportError> {
        let endpoints = self.lock_endpoints();
        let endpoint = endpoints
            .get(&message.to)
            .ok_or_else(|| TransportError::UnknownWorker(message.to.clone()))?;

        debug!(
            call_id = %message.id,
            from = %message.from,
            to = %message.to,
            message_type = %message.message_type(),
            "Delivering message"
        );
        endpoint
            .inbox
            .send(message)
            .map_err(|e| TransportError::Disconnected(e.0.to.clone()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
