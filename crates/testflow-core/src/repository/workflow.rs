//! Workflow and execution repository trait definition.
//!
//! Defines the storage interface for workflow records and execution records.
//! The infrastructure layer implements this trait; the core never touches a
//! concrete store.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use chrono::{DateTime, Utc};
use serde_json::Value;
use testflow_types::error::RepositoryError;
use testflow_types::execution::{Execution, ExecutionStatus};
use testflow_types::workflow::Workflow;
use uuid::Uuid;

/// Repository trait for workflow and execution persistence.
///
/// Implementations must provide two atomicity guarantees:
/// - `transition_execution` applies the execution status state machine
///   atomically per execution row; concurrent attempts to apply the same
///   terminal transition are idempotent (`Ok(false)`).
/// - `save_workflow` replaces the whole record; version arithmetic is done
///   by [`update_workflow`] before saving.
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Upsert a workflow record (insert or replace by ID).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow by its UUID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List workflows, optionally filtered by project.
    fn list_workflows(
        &self,
        project_id: Option<&Uuid>,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Delete a workflow by ID. Returns `true` if it existed.
    fn delete_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Create a new execution record.
    fn create_execution(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by its ID.
    fn get_execution(
        &self,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// List executions of a workflow, newest first.
    fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, RepositoryError>> + Send;

    /// Atomically move an execution through the status state machine.
    ///
    /// Returns `Ok(true)` when the transition was applied, `Ok(false)` when
    /// the execution is already in the target status (idempotent repeat), and
    /// `Err(RepositoryError::IllegalTransition)` when the state machine
    /// forbids the move.
    fn transition_execution(
        &self,
        execution_id: &str,
        to: ExecutionStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record the engine-assigned execution ID after submission.
    fn set_engine_execution_id(
        &self,
        execution_id: &str,
        engine_execution_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record terminal bookkeeping: end time, duration (derived from the
    /// stored start time), step counters, and the result payload.
    fn finalize_execution(
        &self,
        execution_id: &str,
        end_time: DateTime<Utc>,
        result: Option<&Value>,
        total_steps: u32,
        success_steps: u32,
        failed_steps: u32,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// Apply a content update to a stored workflow, bumping the version by
/// exactly 1 when the content (name or definition) changed.
///
/// Metadata-only updates keep the version; the updated record is saved
/// either way. Returns the saved workflow.
pub async fn update_workflow<R: WorkflowRepository>(
    repo: &R,
    mut updated: Workflow,
) -> Result<Workflow, RepositoryError> {
    let existing = repo
        .get_workflow(&updated.id)
        .await?
        .ok_or(RepositoryError::NotFound)?;

    updated.version = existing.version;
    if existing.content_differs(&updated) {
        updated.version = existing.version + 1;
    }
    updated.created_at = existing.created_at;
    updated.updated_at = Utc::now();

    repo.save_workflow(&updated).await?;
    Ok(updated)
}
