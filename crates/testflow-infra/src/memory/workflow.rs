//! In-memory workflow/execution repository backed by `DashMap`.
//!
//! Per-key entry locks give the per-row serialization the core's atomicity
//! contract requires: `transition_execution` holds the execution's entry
//! lock across the check-and-set.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use testflow_core::repository::WorkflowRepository;
use testflow_types::error::RepositoryError;
use testflow_types::execution::{Execution, ExecutionStatus};
use testflow_types::workflow::Workflow;
use uuid::Uuid;

/// In-memory implementation of [`WorkflowRepository`].
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: DashMap<Uuid, Workflow>,
    executions: DashMap<String, Execution>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.get(id).map(|entry| entry.clone()))
    }

    async fn list_workflows(
        &self,
        project_id: Option<&Uuid>,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .iter()
            .filter(|entry| project_id.is_none_or(|p| &entry.project_id == p))
            .map(|entry| entry.clone())
            .collect();
        workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(workflows)
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.workflows.remove(id).is_some())
    }

    async fn create_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        match self.executions.entry(execution.execution_id.clone()) {
            dashmap::Entry::Occupied(_) => {
                Err(RepositoryError::Conflict(execution.execution_id.clone()))
            }
            dashmap::Entry::Vacant(slot) => {
                slot.insert(execution.clone());
                Ok(())
            }
        }
    }

    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<Execution>, RepositoryError> {
        Ok(self.executions.get(execution_id).map(|entry| entry.clone()))
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let mut executions: Vec<Execution> = self
            .executions
            .iter()
            .filter(|entry| &entry.workflow_id == workflow_id)
            .map(|entry| entry.clone())
            .collect();
        executions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        executions.truncate(limit as usize);
        Ok(executions)
    }

    async fn transition_execution(
        &self,
        execution_id: &str,
        to: ExecutionStatus,
    ) -> Result<bool, RepositoryError> {
        let mut entry = self
            .executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        if entry.status == to {
            return Ok(false);
        }
        if !entry.status.can_transition(to) {
            return Err(RepositoryError::IllegalTransition(format!(
                "{:?} -> {:?}",
                entry.status, to
            )));
        }
        tracing::debug!(
            execution_id,
            from = ?entry.status,
            to = ?to,
            "execution status transition"
        );
        entry.status = to;
        Ok(true)
    }

    async fn set_engine_execution_id(
        &self,
        execution_id: &str,
        engine_execution_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut entry = self
            .executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        entry.engine_execution_id = Some(engine_execution_id.to_string());
        Ok(())
    }

    async fn finalize_execution(
        &self,
        execution_id: &str,
        end_time: DateTime<Utc>,
        result: Option<&Value>,
        total_steps: u32,
        success_steps: u32,
        failed_steps: u32,
    ) -> Result<(), RepositoryError> {
        let mut entry = self
            .executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        entry.end_time = Some(end_time);
        entry.duration_ms = Some((end_time - entry.start_time).num_milliseconds().max(0) as u64);
        entry.result = result.cloned();
        entry.total_steps = total_steps;
        entry.success_steps = success_steps;
        entry.failed_steps = failed_steps;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
