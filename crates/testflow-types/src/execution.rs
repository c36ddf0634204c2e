//! Execution tracking types: per-step results, execution records, and the
//! execution status state machine.
//!
//! An [`Execution`] is one concrete run of one workflow against one
//! environment. Its status walks a fixed graph
//! (`pending -> running -> {completed|failed|stopped}`, `running <-> paused`)
//! enforced by [`ExecutionStatus::can_transition`]; terminal states are
//! absorbing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

/// Outcome status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Timeout,
    Skipped,
}

impl StepStatus {
    /// Whether this status stops the enclosing block (failed or timed out).
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::Timeout)
    }
}

/// The result of executing one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// ID of the step that produced this result.
    pub step_id: String,
    /// Outcome status.
    pub status: StepStatus,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Operator- or leaf-specific output payload.
    #[serde(default)]
    pub output: Value,
    /// Error message when the step failed or timed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// A successful result with the given output.
    pub fn success(step_id: impl Into<String>, duration_ms: u64, output: Value) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Success,
            duration_ms,
            output,
            error: None,
        }
    }

    /// A failed result carrying an error message.
    pub fn failed(step_id: impl Into<String>, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            duration_ms,
            output: Value::Null,
            error: Some(error.into()),
        }
    }

    /// A skipped result (condition not met, branch not taken).
    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            duration_ms: 0,
            output: Value::Null,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution record
// ---------------------------------------------------------------------------

/// How an execution runs: debug (authoring) or execute (real run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Debug,
    Execute,
}

/// Persisted status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
    Paused,
}

impl ExecutionStatus {
    /// Whether this status is terminal (absorbing).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }

    /// Whether the state machine permits moving from `self` to `to`.
    ///
    /// Graph: `pending -> running -> {completed|failed|stopped}`,
    /// `running <-> paused`, `paused -> {stopped|failed}`. Terminal states
    /// permit nothing.
    pub fn can_transition(&self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, to) {
            (Pending, Running) => true,
            (Running, Completed | Failed | Stopped | Paused) => true,
            (Paused, Running | Stopped | Failed) => true,
            _ => false,
        }
    }
}

/// One concrete run of one workflow against one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Service-unique execution ID (UUIDv7 string).
    pub execution_id: String,
    /// The workflow being executed.
    pub workflow_id: Uuid,
    /// The environment the run is bound to.
    pub env_id: Uuid,
    /// The worker the run was dispatched to (None = ran locally).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    /// The engine's own ID for this run, recorded after submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_execution_id: Option<String>,
    /// Debug or execute.
    pub mode: ExecutionMode,
    /// Current persisted status.
    pub status: ExecutionStatus,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// `end_time - start_time` in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Total number of steps reported by the engine.
    #[serde(default)]
    pub total_steps: u32,
    /// Steps that succeeded.
    #[serde(default)]
    pub success_steps: u32,
    /// Steps that failed or timed out.
    #[serde(default)]
    pub failed_steps: u32,
    /// Free-form terminal result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

// ---------------------------------------------------------------------------
// Engine-side state
// ---------------------------------------------------------------------------

/// Execution state as reported by an engine.
///
/// Engines may report states this service does not know about; those
/// deserialize to [`EngineState::Unknown`] and are ignored by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
    Stopped,
    Paused,
    #[serde(other)]
    Unknown,
}

impl EngineState {
    /// Map an engine state to the persisted execution status.
    ///
    /// `aborted` and `stopped` both map to `stopped`; unknown states map to
    /// `None` (the monitor keeps polling).
    pub fn to_execution_status(&self) -> Option<ExecutionStatus> {
        match self {
            EngineState::Pending => Some(ExecutionStatus::Pending),
            EngineState::Running => Some(ExecutionStatus::Running),
            EngineState::Completed => Some(ExecutionStatus::Completed),
            EngineState::Failed => Some(ExecutionStatus::Failed),
            EngineState::Aborted | EngineState::Stopped => Some(ExecutionStatus::Stopped),
            EngineState::Paused => Some(ExecutionStatus::Paused),
            EngineState::Unknown => None,
        }
    }
}

/// Snapshot of an execution as reported by an engine poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatusSnapshot {
    /// Current engine-side state.
    pub state: EngineState,
    /// When the engine started the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the engine finished the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Terminal result payload, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub success_steps: u32,
    #[serde(default)]
    pub failed_steps: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // Status state machine
    // -----------------------------------------------------------------------

    #[test]
    fn test_happy_path_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition(Running));
        assert!(Running.can_transition(Completed));
        assert!(Running.can_transition(Failed));
        assert!(Running.can_transition(Stopped));
    }

    #[test]
    fn test_pause_resume_cycle() {
        use ExecutionStatus::*;
        assert!(Running.can_transition(Paused));
        assert!(Paused.can_transition(Running));
        assert!(Paused.can_transition(Stopped));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        use ExecutionStatus::*;
        for terminal in [Completed, Failed, Stopped] {
            assert!(terminal.is_terminal());
            for target in [Pending, Running, Completed, Failed, Stopped, Paused] {
                assert!(
                    !terminal.can_transition(target),
                    "{terminal:?} -> {target:?} must be rejected"
                );
            }
        }
    }

    #[test]
    fn test_pending_cannot_skip_running() {
        use ExecutionStatus::*;
        assert!(!Pending.can_transition(Completed));
        assert!(!Pending.can_transition(Paused));
        assert!(!Pending.can_transition(Stopped));
    }

    // -----------------------------------------------------------------------
    // Engine state mapping
    // -----------------------------------------------------------------------

    #[test]
    fn test_engine_state_mapping() {
        assert_eq!(
            EngineState::Aborted.to_execution_status(),
            Some(ExecutionStatus::Stopped)
        );
        assert_eq!(
            EngineState::Stopped.to_execution_status(),
            Some(ExecutionStatus::Stopped)
        );
        assert_eq!(
            EngineState::Completed.to_execution_status(),
            Some(ExecutionStatus::Completed)
        );
        assert_eq!(EngineState::Unknown.to_execution_status(), None);
    }

    #[test]
    fn test_unrecognized_engine_state_deserializes_to_unknown() {
        let state: EngineState = serde_json::from_str("\"rebalancing\"").unwrap();
        assert_eq!(state, EngineState::Unknown);
    }

    // -----------------------------------------------------------------------
    // StepResult
    // -----------------------------------------------------------------------

    #[test]
    fn test_step_status_is_failure() {
        assert!(StepStatus::Failed.is_failure());
        assert!(StepStatus::Timeout.is_failure());
        assert!(!StepStatus::Success.is_failure());
        assert!(!StepStatus::Skipped.is_failure());
    }

    #[test]
    fn test_step_result_roundtrip() {
        let result = StepResult::success("fetch", 42, json!({"items": 3}));
        let encoded = serde_json::to_string(&result).unwrap();
        let decoded: StepResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, result);
    }

    // -----------------------------------------------------------------------
    // Execution record
    // -----------------------------------------------------------------------

    #[test]
    fn test_execution_json_roundtrip() {
        let exec = Execution {
            execution_id: Uuid::now_v7().to_string(),
            workflow_id: Uuid::now_v7(),
            env_id: Uuid::now_v7(),
            executor_id: Some("worker-7".to_string()),
            engine_execution_id: None,
            mode: ExecutionMode::Execute,
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            total_steps: 10,
            success_steps: 4,
            failed_steps: 0,
            result: None,
        };
        let encoded = serde_json::to_string(&exec).unwrap();
        let decoded: Execution = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.execution_id, exec.execution_id);
        assert_eq!(decoded.status, ExecutionStatus::Running);
        assert_eq!(decoded.executor_id.as_deref(), Some("worker-7"));
    }
}
