//! Executor fleet types: persisted worker records, live runtime status, and
//! the effective view joining the two.
//!
//! A worker (executor) is addressed by its `slave_id`. The persisted record
//! carries operator-managed configuration; the runtime status comes from the
//! engine and describes liveness and load. Dispatch decisions always operate
//! on the [`EffectiveExecutor`] join.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// The kind of worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    Performance,
    #[default]
    Normal,
    Debug,
}

/// Whether a worker may be dispatched to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorStatus {
    #[default]
    Enabled,
    Disabled,
}

/// Persisted configuration for one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorRecord {
    /// Record ID (UUIDv7).
    pub id: Uuid,
    /// Worker address key, unique across the fleet.
    pub slave_id: String,
    /// Operator-assigned display name.
    pub name: String,
    /// The kind of worker.
    #[serde(rename = "type", default)]
    pub executor_type: ExecutorType,
    /// Scheduling labels (exact-case keys and values).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Maximum virtual users this worker can host.
    #[serde(default)]
    pub max_vus: u32,
    /// List-ordering priority (higher sorts first).
    #[serde(default)]
    pub priority: i32,
    /// Enabled/disabled flag.
    #[serde(default)]
    pub status: ExecutorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Runtime status
// ---------------------------------------------------------------------------

/// Live state of a worker as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Online,
    Busy,
    Offline,
}

impl WorkerState {
    /// Whether the worker can accept work (online or busy, not offline).
    pub fn is_available(&self) -> bool {
        matches!(self, WorkerState::Online | WorkerState::Busy)
    }
}

/// Runtime status fetched from the engine for one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    /// Worker address key.
    pub slave_id: String,
    /// Network address the worker registered from.
    pub address: String,
    /// Liveness state.
    pub state: WorkerState,
    /// Load factor in `[0, 1]`.
    pub load: f64,
    /// Number of tasks currently assigned.
    #[serde(default)]
    pub active_tasks: u32,
    /// Virtual users currently running.
    #[serde(default)]
    pub current_vus: u32,
    /// Last heartbeat.
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Effective view
// ---------------------------------------------------------------------------

/// The join of a persisted record with its current runtime status.
///
/// Persisted fields pass through unchanged; a missing runtime status reads
/// as offline with full load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveExecutor {
    #[serde(flatten)]
    pub record: ExecutorRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeStatus>,
}

impl EffectiveExecutor {
    /// The worker's live state; offline when the engine has not reported it.
    pub fn state(&self) -> WorkerState {
        self.runtime
            .as_ref()
            .map(|r| r.state)
            .unwrap_or(WorkerState::Offline)
    }

    /// The worker's load factor; `1.0` when no runtime status is known.
    pub fn load(&self) -> f64 {
        self.runtime.as_ref().map(|r| r.load).unwrap_or(1.0)
    }

    /// Whether this worker may receive a dispatch right now.
    pub fn is_dispatchable(&self) -> bool {
        self.record.status == ExecutorStatus::Enabled && self.state().is_available()
    }
}

// ---------------------------------------------------------------------------
// Filters and dispatch strategy
// ---------------------------------------------------------------------------

/// Filter for listing executors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorFilter {
    /// Substring match on the display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_type: Option<ExecutorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutorStatus>,
    /// Label subset the executor must carry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// How an execution is assigned to a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Run on the submitting host; no worker is selected.
    #[default]
    Local,
    /// Run on one explicitly chosen worker.
    Manual { slave_id: String },
    /// Pick the lowest-load available worker whose labels cover the request.
    Auto {
        #[serde(default)]
        labels: BTreeMap<String, String>,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
