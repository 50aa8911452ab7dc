/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fault-injecting transport for timeout testing.
//!
//! [`FaultyTransport`] wraps a real transport and, per [`MessageType`]:
//!
//! | Setting | Effect |
//! |---|---|
//! | `messages_to_delay` | delivery is postponed by the given duration; `send` still returns immediately |
//! | `faulty_messages` + `num_fail_sends` | the first `num_fail_sends` sends of each listed type fail with [`TransportError::InjectedFailure`] |
//!
//! Delaying `SCRIPT_CALL` by more than a call's timeout is the standard way
//! to force the deadline watchdog to win the race against the reply.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::{Message, MessageType, Transport, TransportError, WorkerInfo};

/// Which messages to delay or fail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultPlan {
    pub messages_to_delay: HashMap<MessageType, Duration>,
    pub faulty_messages: HashSet<MessageType>,
    pub num_fail_sends: u32,
}

impl FaultPlan {
    /// Delay every message of `message_type` by `delay`.
    pub fn delay(mut self, message_type: MessageType, delay: Duration) -> Self {
        self.messages_to_delay.insert(message_type, delay);
        self
    }

    /// Fail the first `times` sends of `message_type`.
    pub fn fail(mut self, message_type: MessageType, times: u32) -> Self {
        self.faulty_messages.insert(message_type);
        self.num_fail_sends = times;
        self
    }

    /// `true` if the plan changes any behaviour at all.
    pub fn is_active(&self) -> bool {
        !self.messages_to_delay.is_empty()
            || (!self.faulty_messages.is_empty() && self.num_fail_sends > 0)
    }
}

/// Transport wrapper that injects the faults described by a [`FaultPlan`].
pub struct FaultyTransport<T> {
    inner: Arc<T>,
    plan: FaultPlan,
    failed_sends: Mutex<HashMap<MessageType, u32>>,
    runtime: Handle,
}

impl<T: Transport> FaultyTransport<T> {
    /// Wrap `inner`.  Delayed deliveries are spawned on `runtime`.
    pub fn new(inner: Arc<T>, plan: FaultPlan, runtime: Handle) -> Self {
        Self {
            inner,
            plan,
            failed_sends: Mutex::new(HashMap::new()),
            runtime,
        }
    }

    pub fn plan(&self) -> &FaultPlan {
        &self.plan
    }

    /// Count this send against the failure budget; `true` if it must fail.
    fn should_fail(&self, message_type: MessageType) -> bool {
        if !self.plan.faulty_messages.contains(&message_type) {
            return false;
        }
        let mut failed = self
            .failed_sends
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let count = failed.entry(message_type).or_insert(0);
        if *count < self.plan.num_fail_sends {
            *count += 1;
            true
        } else {
            false
        }
    }
}

impl<T: Transport> Transport for FaultyTransport<T> {
    fn resolve(&self, name: &str) -> Option<WorkerInfo> {
        self.inner.resolve(name)
    }

    fn send(&self, message: Message) -> Result<(), TransportError> {
        let message_type = message.message_type();

        if self.should_fail(message_type) {
            warn!(
                call_id = %message.id,
                to = %message.to,
                message_type = %message_type,
                "Injecting send failure"
            );
            return Err(TransportError::InjectedFailure {
                message_type,
                to: message.to,
            });
        }

        let Some(delay) = self.plan.messages_to_delay.get(&message_type).copied() else {
            return self.inner.send(message);
        };

        debug!(
            call_id = %message.id,
            to = %message.to,
            message_type = %message_type,
            delay_ms = delay.as_millis() as u64,
            "Delaying message"
        );
        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let id = message.id;
            if let Err(e) = inner.send(message) {
                warn!(call_id = %id, "Delayed delivery failed: {}", e);
            }
        });
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
