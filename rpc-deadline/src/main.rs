/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use rpc_deadline::config::RpcConfig;
use rpc_deadline::script::builtins::{
    RPC_ASYNC_CALL_REMOTE_SCRIPT, RPC_ASYNC_CALL_WITH_TIMEOUT, TWO_ARGS_TWO_KWARGS,
};
use rpc_deadline::script::{FunctionRegistry, ScriptError, ScriptFunctionRef, Tensor, Value};
use rpc_deadline::transport::MessageType;
use rpc_deadline::{RpcAgent, RpcError, World};

const DEFAULT_CALL_DELAY_SECS: f64 = 1.5;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Exercise RPC deadlines against a worker whose SCRIPT_CALL messages are
/// delayed.
///
/// Example:
///   rpc-deadline --delay 1.5 --timeout 0.5
///   RUST_LOG=debug rpc-deadline --config faulty_agent.yaml
#[derive(Debug, Parser)]
#[command(
    name = "rpc-deadline",
    about = "Deadline-bounded RPC futures – fault-injection scenarios",
    long_about = None,
)]
struct Cli {
    /// Path to a YAML world configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Number of workers (overrides the configuration file).
    #[arg(short = 'w', long = "world-size")]
    world_size: Option<u32>,

    /// SCRIPT_CALL delivery delay in seconds (overrides the configuration file).
    #[arg(short = 'd', long = "delay")]
    delay: Option<f64>,

    /// Explicit per-call timeout in seconds; must be shorter than the delay.
    #[arg(short = 't', long = "timeout", default_value_t = 0.5)]
    timeout: f64,
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Expect {
    Timeout,
    Sum,
}

#[derive(Debug)]
struct Scenario {
    name: &'static str,
    /// Explicit timeout passed to the call; `None` uses the default.
    timeout: Option<f64>,
    /// Default timeout installed for the duration of the scenario.
    default_override: Option<f64>,
    expect: Expect,
}

fn scenarios(timeout: f64) -> [Scenario; 3] {
    [
        Scenario {
            name: "explicit timeout",
            timeout: Some(timeout),
            default_override: None,
            expect: Expect::Timeout,
        },
        Scenario {
            name: "tiny default timeout",
            timeout: None,
            default_override: Some(0.001),
            expect: Expect::Timeout,
        },
        Scenario {
            name: "zero timeout",
            timeout: Some(0.0),
            default_override: None,
            expect: Expect::Sum,
        },
    ]
}

fn sum_args() -> Vec<Value> {
    vec![Tensor::from([1, 1]).into(), Tensor::from([2, 2]).into()]
}

fn sum_kwargs() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("first_kwarg".to_string(), Tensor::from([2, 2]).into()),
        ("second_kwarg".to_string(), Tensor::from([3, 3]).into()),
    ])
}

/// Issue the call from inside a compiled function that blocks on it.
async fn run_from_script(
    agent: &RpcAgent,
    dst: &str,
    scenario: &Scenario,
) -> Result<Result<Value, RpcError>> {
    let (function, mut args) = match scenario.timeout {
        Some(_) => (RPC_ASYNC_CALL_WITH_TIMEOUT, Vec::with_capacity(4)),
        None => (RPC_ASYNC_CALL_REMOTE_SCRIPT, Vec::with_capacity(3)),
    };
    args.push(Value::from(dst));
    args.push(Value::Tuple(sum_args()));
    args.push(Value::Dict(sum_kwargs()));
    if let Some(t) = scenario.timeout {
        args.push(Value::Float(t));
    }

    let agent = agent.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        agent.run_script(&ScriptFunctionRef::new(function), args, BTreeMap::new())
    })
    .await
    .context("script function panicked")?;

    match outcome {
        Ok(value) => Ok(Ok(value)),
        Err(ScriptError::Rpc(e)) => Ok(Err(e)),
        Err(e) => Err(e).context("script function failed before dispatch"),
    }
}

/// Issue the call from async code and await the future.
async fn run_from_async(
    agent: &RpcAgent,
    dst: &str,
    scenario: &Scenario,
) -> Result<Result<Value, RpcError>> {
    let fut = agent
        .rpc_async(
            dst,
            &ScriptFunctionRef::new(TWO_ARGS_TWO_KWARGS),
            sum_args(),
            sum_kwargs(),
            scenario.timeout,
        )
        .context("dispatch failed")?;
    Ok(fut.wait().await)
}

/// Log the outcome; `true` if it matches the expectation.
fn check(form: &str, scenario: &Scenario, outcome: &Result<Value, RpcError>, took: Duration) -> bool {
    let expected_sum = Value::Tensor(Tensor::from([8, 8]));
    let ok = match (scenario.expect, outcome) {
        (Expect::Timeout, Err(e)) => e.is_timeout(),
        (Expect::Sum, Ok(v)) => *v == expected_sum,
        _ => false,
    };

    let took_ms = took.as_millis() as u64;
    match outcome {
        Ok(v) if ok => info!(form, scenario = scenario.name, took_ms, "PASS: returned {}", v),
        Err(e) if ok => info!(form, scenario = scenario.name, took_ms, "PASS: {}", e),
        Ok(v) => error!(form, scenario = scenario.name, took_ms, "FAIL: unexpected value {}", v),
        Err(e) => error!(form, scenario = scenario.name, took_ms, "FAIL: unexpected error {}", e),
    }
    ok
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => RpcConfig::load_from_file(path)?,
        None => {
            warn!("No configuration file provided, using defaults");
            RpcConfig::default()
        }
    };

    if let Some(world_size) = cli.world_size {
        config.world_size = world_size;
    }
    ensure!(config.world_size >= 2, "the scenarios need at least two workers");

    let delay = match cli.delay {
        Some(secs) => {
            ensure!(secs.is_finite() && secs >= 0.0, "--delay must be non-negative");
            Duration::from_secs_f64(secs)
        }
        None => config
            .fault_injection
            .messages_to_delay
            .get(&MessageType::ScriptCall)
            .copied()
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_CALL_DELAY_SECS)),
    };
    config
        .fault_injection
        .messages_to_delay
        .insert(MessageType::ScriptCall, delay);

    ensure!(
        cli.timeout > 0.0 && cli.timeout < delay.as_secs_f64(),
        "--timeout ({}) must be positive and shorter than the SCRIPT_CALL delay ({})",
        cli.timeout,
        delay.as_secs_f64()
    );

    info!(
        world_size = config.world_size,
        delay_ms = delay.as_millis() as u64,
        timeout_secs = cli.timeout,
        "Configuration"
    );

    let world = World::start(&config, FunctionRegistry::with_builtins())?;
    let caller = world.agent(0).context("worker0 missing")?.clone();
    let callee = world.agent(1).context("worker1 missing")?.name().to_string();

    let mut all_ok = true;
    for form in ["script", "async"] {
        for scenario in scenarios(cli.timeout) {
            let _guard = scenario
                .default_override
                .map(|secs| caller.override_default_timeout(secs))
                .transpose()?;

            let started = Instant::now();
            let outcome = match form {
                "script" => run_from_script(&caller, &callee, &scenario).await?,
                _ => run_from_async(&caller, &callee, &scenario).await?,
            };
            all_ok &= check(form, &scenario, &outcome, started.elapsed());
        }
    }

    world.default_timeout().reset();
    world.shutdown().await;
    Ok(all_ok)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(config = ?cli.config, "rpc-deadline starting up...");

    match run(cli).await {
        Ok(true) => info!("All scenarios behaved as expected"),
        Ok(false) => {
            error!("One or more scenarios deviated");
            process::exit(1);
        }
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
