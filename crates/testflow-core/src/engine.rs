//! Engine client seam: the RPC surface the execution supervisor drives.
//!
//! An engine hosts the flow interpreter (locally in-process, or on a remote
//! runner) and owns the live run. Every call is fallible; only status polling
//! is retried, by the monitor loop.

use serde::{Deserialize, Serialize};
use testflow_types::error::EngineError;
use testflow_types::execution::{EngineStatusSnapshot, ExecutionMode};
use testflow_types::executor::RuntimeStatus;
use testflow_types::workflow::FlowDefinition;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Submit request
// ---------------------------------------------------------------------------

/// A fully prepared workflow submission: definition already merged with its
/// environment, worker already chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Service-side execution ID (the engine may assign its own).
    pub execution_id: String,
    /// The workflow being run.
    pub workflow_id: Uuid,
    /// Name for log correlation.
    pub workflow_name: String,
    /// The merged, validated definition.
    pub definition: FlowDefinition,
    /// Debug or execute.
    pub mode: ExecutionMode,
    /// Chosen worker (`None` = run on the engine host itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
}

// ---------------------------------------------------------------------------
// EngineClient trait
// ---------------------------------------------------------------------------

/// Client for one engine instance.
pub trait EngineClient: Send + Sync {
    /// Submit a prepared workflow; returns the engine's execution ID.
    fn submit(
        &self,
        request: &SubmitRequest,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;

    /// Poll the current state of an engine execution.
    fn status(
        &self,
        engine_execution_id: &str,
    ) -> impl std::future::Future<Output = Result<EngineStatusSnapshot, EngineError>> + Send;

    /// Stop a run.
    fn stop(
        &self,
        engine_execution_id: &str,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// Pause a run.
    fn pause(
        &self,
        engine_execution_id: &str,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// Resume a paused run.
    fn resume(
        &self,
        engine_execution_id: &str,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// Fetch a sample of recent log lines for a run.
    fn sample_logs(
        &self,
        engine_execution_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, EngineError>> + Send;

    /// List the workers this engine knows about, with live status.
    fn list_workers(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RuntimeStatus>, EngineError>> + Send;
}
