//! Supervisor configuration: poll cadence and per-workflow-type monitor
//! ceilings.
//!
//! Loaded from a TOML file when present; falls back to defaults when the
//! file is missing or malformed.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use testflow_types::workflow::WorkflowType;

/// Default poll cadence for the execution monitor (1 s).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default monitor ceiling (30 min).
pub const DEFAULT_MONITOR_CEILING_SECS: u64 = 1800;

/// Default monitor ceiling for performance workflows (2 h); load tests run
/// long by design.
pub const DEFAULT_PERFORMANCE_CEILING_SECS: u64 = 7200;

/// Configuration for the execution supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How often the monitor polls the engine, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fallback monitor ceiling in seconds.
    #[serde(default = "default_monitor_ceiling_secs")]
    pub default_monitor_ceiling_secs: u64,
    /// Per-workflow-type monitor ceilings in seconds, keyed by type name
    /// (`normal`, `performance`, `data_generation`).
    #[serde(default)]
    pub monitor_ceiling_secs: HashMap<String, u64>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_monitor_ceiling_secs() -> u64 {
    DEFAULT_MONITOR_CEILING_SECS
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_monitor_ceiling_secs: DEFAULT_MONITOR_CEILING_SECS,
            monitor_ceiling_secs: HashMap::from([(
                WorkflowType::Performance.as_str().to_string(),
                DEFAULT_PERFORMANCE_CEILING_SECS,
            )]),
        }
    }
}

impl SupervisorConfig {
    /// The poll cadence as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// The monitor ceiling for a workflow type.
    pub fn monitor_ceiling(&self, workflow_type: WorkflowType) -> Duration {
        let secs = self
            .monitor_ceiling_secs
            .get(workflow_type.as_str())
            .copied()
            .unwrap_or(self.default_monitor_ceiling_secs);
        Duration::from_secs(secs)
    }

    /// Parse a TOML document into a config.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from `path`.
    ///
    /// - Missing file: returns the default config.
    /// - Unparseable file: logs a warning and returns the default config.
    pub async fn load(path: &Path) -> Self {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no supervisor config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(err) => {
                tracing::warn!("failed to read {}: {err}, using defaults", path.display());
                return Self::default();
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("failed to parse {}: {err}, using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
