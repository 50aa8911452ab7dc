/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! A set of in-process workers sharing one network and one default timeout.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::info;

use crate::agent::{AgentOptions, RpcAgent};
use crate::config::RpcConfig;
use crate::script::FunctionRegistry;
use crate::timeout::DefaultTimeout;
use crate::transport::{worker_name, FaultyTransport, LocalNetwork, Transport};

/// Running workers `worker0` … `worker{n-1}`.
#[derive(Debug)]
pub struct World {
    network: Arc<LocalNetwork>,
    agents: Vec<RpcAgent>,
    default_timeout: Arc<DefaultTimeout>,
}

impl World {
    /// Start `config.world_size` agents, each registering `functions`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &RpcConfig, functions: FunctionRegistry) -> Result<World> {
        let runtime = Handle::try_current().context("World::start requires a tokio runtime")?;

        let network = Arc::new(LocalNetwork::new());
        let transport: Arc<dyn Transport> = if config.fault_injection.is_active() {
            info!(plan = ?config.fault_injection, "Fault injection enabled");
            Arc::new(FaultyTransport::new(
                Arc::clone(&network),
                config.fault_injection.clone(),
                runtime.clone(),
            ))
        } else {
            Arc::clone(&network) as Arc<dyn Transport>
        };

        let functions = Arc::new(functions);
        let default_timeout = Arc::new(DefaultTimeout::new(config.default_timeout));
        let options = AgentOptions {
            watchdog_interval: config.watchdog_interval,
        };

        let mut agents = Vec::with_capacity(config.world_size as usize);
        for rank in 0..config.world_size {
            let (info, inbox) = network
                .join(rank, worker_name(rank))
                .with_context(|| format!("Failed to attach worker {rank}"))?;
            agents.push(RpcAgent::start(
                info,
                Arc::clone(&transport),
                inbox,
                Arc::clone(&functions),
                Arc::clone(&default_timeout),
                options.clone(),
                runtime.clone(),
            ));
        }

        info!(
            world_size = config.world_size,
            default_timeout_ms = config.default_timeout.as_millis() as u64,
            "World started"
        );
        Ok(World {
            network,
            agents,
            default_timeout,
        })
    }

    /// Agent for `rank`, if it exists.
    pub fn agent(&self, rank: u32) -> Option<&RpcAgent> {
        self.agents.get(rank as usize)
    }

    pub fn agents(&self) -> &[RpcAgent] {
        &self.agents
    }

    pub fn world_size(&self) -> u32 {
        self.agents.len() as u32
    }

    /// The default timeout shared by every agent of this world.
    pub fn default_timeout(&self) -> &Arc<DefaultTimeout> {
        &self.default_timeout
    }

    /// Shut every agent down and detach it from the network.
    pub async fn shutdown(self) {
        for agent in &self.agents {
            agent.shutdown().await;
            self.network.leave(agent.name());
        }
        info!("World shut down");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::script::builtins::TWO_ARGS_TWO_KWARGS;
    use crate::script::{ScriptFunctionRef, Tensor, Value};

    #[tokio::test]
    async fn start_names_workers_by_rank() {
        let config = RpcConfig {
            world_size: 3,
            ..RpcConfig::default()
        };
        let world = World::start(&config, FunctionRegistry::with_builtins()).unwrap();

        assert_eq!(world.world_size(), 3);
        let names: Vec<&str> = world.agents().iter().map(RpcAgent::name).collect();
        assert_eq!(names, ["worker0", "worker1", "worker2"]);
        assert_eq!(world.agent(2).unwrap().info().id, 2);
        assert!(world.agent(3).is_none());

        world.shutdown().await;
    }

    #[tokio::test]
    async fn agents_share_one_default_timeout() {
        let world = World::start(&RpcConfig::default(), FunctionRegistry::with_builtins()).unwrap();
        let a0 = world.agent(0).unwrap().clone();
        let a1 = world.agent(1).unwrap().clone();

        a0.set_default_timeout(0.25).unwrap();
        assert_eq!(a1.get_default_timeout(), Duration::from_millis(250));
        assert_eq!(world.default_timeout().get(), Duration::from_millis(250));

        world.shutdown().await;
    }

    #[tokio::test]
    async fn round_trip_between_workers() {
        let world = World::start(&RpcConfig::default(), FunctionRegistry::with_builtins()).unwrap();
        let value = world
            .agent(0)
            .unwrap()
            .rpc_sync(
                "worker1",
                &ScriptFunctionRef::new(TWO_ARGS_TWO_KWARGS),
                vec![Tensor::from([1, 1]).into(), Tensor::from([2, 2]).into()],
                BTreeMap::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, Value::Tensor(Tensor::from([10, 10])));

        world.shutdown().await;
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let err = World::start(&RpcConfig::default(), FunctionRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("tokio runtime"));
    }
}
