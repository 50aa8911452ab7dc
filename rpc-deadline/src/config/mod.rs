//! World and fault-injection configuration.
//!
//! The expected YAML structure is:
//! ```yaml
//! world_size: 2
//! rpc:
//!   default_timeout_secs: 60.0
//!   watchdog_interval_ms: 10
//! fault_injection:
//!   messages_to_delay:
//!     SCRIPT_CALL: 1.5
//!   faulty_messages: []
//!   num_fail_sends: 0
//! ```
//!
//! Every section is optional; missing values fall back to the defaults shown
//! above (with no faults injected).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::timeout::{timeout_from_secs, DEFAULT_RPC_TIMEOUT_SEC};
use crate::transport::{FaultPlan, MessageType};
use crate::watchdog::DEFAULT_SCAN_INTERVAL;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// This is kept private – callers work with [`RpcConfig`] instead.
#[derive(Debug, Deserialize)]
struct RpcConfigFile {
    #[serde(default = "default_world_size")]
    world_size: u32,
    #[serde(default)]
    rpc: RpcSection,
    #[serde(default)]
    fault_injection: FaultSection,
}

#[derive(Debug, Deserialize)]
struct RpcSection {
    #[serde(default = "default_timeout_secs")]
    default_timeout_secs: f64,
    #[serde(default = "default_watchdog_interval_ms")]
    watchdog_interval_ms: u64,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
        }
    }
}

/// Message types stay strings here so an unknown name produces a readable
/// error instead of a serde variant message.
#[derive(Debug, Default, Deserialize)]
struct FaultSection {
    #[serde(default)]
    messages_to_delay: HashMap<String, f64>,
    #[serde(default)]
    faulty_messages: Vec<String>,
    #[serde(default)]
    num_fail_sends: u32,
}

fn default_world_size() -> u32 {
    2
}

fn default_timeout_secs() -> f64 {
    DEFAULT_RPC_TIMEOUT_SEC
}

fn default_watchdog_interval_ms() -> u64 {
    DEFAULT_SCAN_INTERVAL.as_millis() as u64
}

// ── Public configuration ──────────────────────────────────────────────────────

/// Validated configuration for one [`World`](crate::world::World).
#[derive(Debug, Clone, PartialEq)]
pub struct RpcConfig {
    /// Number of workers (`worker0` … `worker{n-1}`).
    pub world_size: u32,
    /// Initial process-wide default timeout.  Zero means no deadline.
    pub default_timeout: Duration,
    /// Deadline watchdog scan interval.
    pub watchdog_interval: Duration,
    /// Faults injected into the transport.
    pub fault_injection: FaultPlan,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            world_size: default_world_size(),
            default_timeout: Duration::from_secs_f64(DEFAULT_RPC_TIMEOUT_SEC),
            watchdog_interval: DEFAULT_SCAN_INTERVAL,
            fault_injection: FaultPlan::default(),
        }
    }
}

impl RpcConfig {
    /// Read and validate a YAML configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or a value fails validation.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading RPC configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: RpcConfigFile =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        ensure!(file.world_size >= 1, "world_size must be at least 1");
        ensure!(
            file.rpc.watchdog_interval_ms > 0,
            "rpc.watchdog_interval_ms must be greater than zero"
        );

        let default_timeout = timeout_from_secs(file.rpc.default_timeout_secs)
            .context("rpc.default_timeout_secs")?;

        let mut plan = FaultPlan {
            num_fail_sends: file.fault_injection.num_fail_sends,
            ..FaultPlan::default()
        };
        for (name, secs) in &file.fault_injection.messages_to_delay {
            let message_type: MessageType = name
                .parse()
                .with_context(|| format!("fault_injection.messages_to_delay: '{name}'"))?;
            if !secs.is_finite() || *secs < 0.0 {
                bail!("fault_injection.messages_to_delay.{name}: delay must be non-negative, got {secs}");
            }
            plan.messages_to_delay
                .insert(message_type, Duration::from_secs_f64(*secs));
        }
        for name in &file.fault_injection.faulty_messages {
            let message_type: MessageType = name
                .parse()
                .with_context(|| format!("fault_injection.faulty_messages: '{name}'"))?;
            plan.faulty_messages.insert(message_type);
        }

        let config = RpcConfig {
            world_size: file.world_size,
            default_timeout,
            watchdog_interval: Duration::from_millis(file.rpc.watchdog_interval_ms),
            fault_injection: plan,
        };

        debug!(
            world_size = config.world_size,
            default_timeout_ms = config.default_timeout.as_millis() as u64,
            watchdog_interval_ms = config.watchdog_interval.as_millis() as u64,
            faults_active = config.fault_injection.is_active(),
            "Parsed RPC configuration"
        );
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_faulty_agent_yaml() {
        let yaml = r#"
world_size: 4
rpc:
  default_timeout_secs: 0.001
  watchdog_interval_ms: 5
fault_injection:
  messages_to_delay:
    SCRIPT_CALL: 1.5
  faulty_messages: [SCRIPT_RET]
  num_fail_sends: 2
"#;
        let f = yaml_tempfile(yaml);
        let cfg = RpcConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.world_size, 4);
        assert_eq!(cfg.default_timeout, Duration::from_millis(1));
        assert_eq!(cfg.watchdog_interval, Duration::from_millis(5));
        assert_eq!(
            cfg.fault_injection.messages_to_delay.get(&MessageType::ScriptCall),
            Some(&Duration::from_millis(1500))
        );
        assert!(cfg.fault_injection.faulty_messages.contains(&MessageType::ScriptRet));
        assert_eq!(cfg.fault_injection.num_fail_sends, 2);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = RpcConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, RpcConfig::default());
        assert!(!cfg.fault_injection.is_active());
    }

    #[test]
    fn zero_default_timeout_is_accepted() {
        let cfg = RpcConfig::from_yaml_str("rpc:\n  default_timeout_secs: 0\n").unwrap();
        assert_eq!(cfg.default_timeout, Duration::ZERO);
    }

    #[test]
    fn negative_default_timeout_is_rejected() {
        let err = RpcConfig::from_yaml_str("rpc:\n  default_timeout_secs: -1\n").unwrap_err();
        assert!(format!("{err:#}").contains("default_timeout_secs"));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let yaml = "fault_injection:\n  messages_to_delay:\n    REMOTE_PROFILE: 1.0\n";
        let err = RpcConfig::from_yaml_str(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("REMOTE_PROFILE"));
    }

    #[test]
    fn negative_delay_is_rejected() {
        let yaml = "fault_injection:\n  messages_to_delay:\n    SCRIPT_CALL: -0.5\n";
        assert!(RpcConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn zero_world_size_is_rejected() {
        assert!(RpcConfig::from_yaml_str("world_size: 0\n").is_err());
    }

    #[test]
    fn zero_watchdog_interval_is_rejected() {
        assert!(RpcConfig::from_yaml_str("rpc:\n  watchdog_interval_ms: 0\n").is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        assert!(RpcConfig::load_from_file(Path::new("/nonexistent/path/rpc.yaml")).is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(RpcConfig::load_from_file(f.path()).is_err());
    }
}
