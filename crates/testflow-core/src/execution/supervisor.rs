//! Execution supervisor: drives one workflow execution from submission to a
//! terminal state.
//!
//! The submission pipeline is synchronous: load and validate the workflow,
//! resolve the environment, merge bindings, choose a worker, persist the
//! execution record, submit to the engine, and spawn the background monitor.
//! Operator actions (`stop`, `pause`, `resume`) validate the status state
//! machine, mutate the persisted record atomically, and propagate to the
//! engine.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use testflow_types::error::{EngineError, RepositoryError};
use testflow_types::execution::{Execution, ExecutionMode, ExecutionStatus};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::definition::validate_definition;
use crate::engine::{EngineClient, SubmitRequest};
use crate::environment::{BindingsProvider, ConfigMerger, MergeError};
use crate::execution::monitor::{MonitorParams, spawn_monitor};
use crate::fleet::{FleetError, FleetManager};
use crate::repository::{ExecutorRepository, WorkflowRepository};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from submission and operator actions.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The submission is malformed or not allowed for this workflow.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("environment not found: {0}")]
    EnvironmentNotFound(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// The status state machine forbids the requested action.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for SupervisorError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::IllegalTransition(message) => {
                SupervisorError::IllegalTransition(message)
            }
            other => SupervisorError::Repository(other),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionSupervisor
// ---------------------------------------------------------------------------

/// Supervisor over repository, fleet, engine, bindings, and merger seams.
pub struct ExecutionSupervisor<R, X, E, B, M>
where
    R: WorkflowRepository + 'static,
    X: ExecutorRepository + 'static,
    E: EngineClient + 'static,
    B: BindingsProvider,
    M: ConfigMerger,
{
    repo: Arc<R>,
    fleet: FleetManager<X, E>,
    engine: Arc<E>,
    bindings: Arc<B>,
    merger: M,
    config: SupervisorConfig,
}

impl<R, X, E, B, M> ExecutionSupervisor<R, X, E, B, M>
where
    R: WorkflowRepository + 'static,
    X: ExecutorRepository + 'static,
    E: EngineClient + 'static,
    B: BindingsProvider,
    M: ConfigMerger,
{
    pub fn new(
        repo: Arc<R>,
        fleet: FleetManager<X, E>,
        engine: Arc<E>,
        bindings: Arc<B>,
        merger: M,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            repo,
            fleet,
            engine,
            bindings,
            merger,
            config,
        }
    }

    /// Submit a workflow for execution against an environment.
    ///
    /// `mode` defaults to `execute`. On success the execution record is
    /// `running`, the engine owns the run, and a background monitor polls it
    /// to a terminal state.
    pub async fn submit(
        &self,
        workflow_id: Uuid,
        env_id: Uuid,
        mode: Option<ExecutionMode>,
    ) -> Result<Execution, SupervisorError> {
        // 1. Load the workflow.
        let workflow = self
            .repo
            .get_workflow(&workflow_id)
            .await?
            .ok_or(SupervisorError::WorkflowNotFound(workflow_id))?;
        if workflow.status == testflow_types::workflow::WorkflowStatus::Disabled {
            return Err(SupervisorError::Validation(format!(
                "workflow '{}' is disabled",
                workflow.name
            )));
        }

        // 2. Determine and check the mode.
        let mode = mode.unwrap_or(ExecutionMode::Execute);
        if !workflow.workflow_type.allows_mode(mode) {
            return Err(SupervisorError::Validation(
                "normal workflows support debug mode only".to_string(),
            ));
        }

        // 3. Structural validation of the definition.
        validate_definition(&workflow.definition)
            .map_err(|e| SupervisorError::Validation(e.to_string()))?;

        // 4. Resolve the environment; it must belong to the same project.
        let env = self
            .bindings
            .environment(&env_id)
            .await?
            .ok_or(SupervisorError::EnvironmentNotFound(env_id))?;
        if env.project_id != workflow.project_id {
            return Err(SupervisorError::Validation(format!(
                "environment '{}' belongs to a different project",
                env.name
            )));
        }

        // 5. Merge environment bindings into the definition.
        let bindings = self.bindings.bindings(&env_id).await?;
        let definition = self
            .merger
            .merge(workflow.definition.clone(), &env, &bindings)?;

        // 6. Choose a worker.
        let executor = self.fleet.select(&workflow.executor_config).await?;
        let executor_id = executor.map(|e| e.record.slave_id);

        // 7. Persist the execution: pending, then running.
        let execution_id = Uuid::now_v7().to_string();
        let mut execution = Execution {
            execution_id: execution_id.clone(),
            workflow_id,
            env_id,
            executor_id: executor_id.clone(),
            engine_execution_id: None,
            mode,
            status: ExecutionStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            total_steps: 0,
            success_steps: 0,
            failed_steps: 0,
            result: None,
        };
        self.repo.create_execution(&execution).await?;
        self.repo
            .transition_execution(&execution_id, ExecutionStatus::Running)
            .await?;
        execution.status = ExecutionStatus::Running;

        tracing::info!(
            execution_id = execution_id.as_str(),
            workflow = workflow.name.as_str(),
            mode = ?mode,
            executor = executor_id.as_deref().unwrap_or("local"),
            "submitting execution"
        );

        // 8. Submit to the engine; on failure the execution is failed and
        // the error surfaces to the caller.
        let request = SubmitRequest {
            execution_id: execution_id.clone(),
            workflow_id,
            workflow_name: workflow.name.clone(),
            definition,
            mode,
            executor_id,
        };
        let engine_execution_id = match self.engine.submit(&request).await {
            Ok(id) => id,
            Err(error) => {
                tracing::error!(
                    execution_id = execution_id.as_str(),
                    error = %error,
                    "engine submission failed"
                );
                let _ = self
                    .repo
                    .transition_execution(&execution_id, ExecutionStatus::Failed)
                    .await;
                let _ = self
                    .repo
                    .finalize_execution(
                        &execution_id,
                        Utc::now(),
                        Some(&json!({ "error": error.to_string() })),
                        0,
                        0,
                        0,
                    )
                    .await;
                return Err(SupervisorError::Engine(error));
            }
        };
        self.repo
            .set_engine_execution_id(&execution_id, &engine_execution_id)
            .await?;
        execution.engine_execution_id = Some(engine_execution_id.clone());

        spawn_monitor(
            Arc::clone(&self.repo),
            Arc::clone(&self.engine),
            MonitorParams {
                execution_id,
                engine_execution_id,
                poll_interval: self.config.poll_interval(),
                ceiling: self.config.monitor_ceiling(workflow.workflow_type),
            },
        );

        Ok(execution)
    }

    /// Stop a running or paused execution. Idempotent on repeats.
    pub async fn stop(&self, execution_id: &str) -> Result<(), SupervisorError> {
        let execution = self.load_execution(execution_id).await?;
        match self
            .repo
            .transition_execution(execution_id, ExecutionStatus::Stopped)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.propagate(&execution, EngineAction::Stop).await
    }

    /// Pause a running execution.
    pub async fn pause(&self, execution_id: &str) -> Result<(), SupervisorError> {
        let execution = self.load_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Running {
            return Err(SupervisorError::IllegalTransition(format!(
                "cannot pause execution in status {:?}",
                execution.status
            )));
        }
        match self
            .repo
            .transition_execution(execution_id, ExecutionStatus::Paused)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.propagate(&execution, EngineAction::Pause).await
    }

    /// Resume a paused execution.
    pub async fn resume(&self, execution_id: &str) -> Result<(), SupervisorError> {
        let execution = self.load_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Paused {
            return Err(SupervisorError::IllegalTransition(format!(
                "cannot resume execution in status {:?}",
                execution.status
            )));
        }
        match self
            .repo
            .transition_execution(execution_id, ExecutionStatus::Running)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.propagate(&execution, EngineAction::Resume).await
    }

    /// Fetch a sample of recent engine log lines for an execution.
    pub async fn sample_logs(&self, execution_id: &str) -> Result<Vec<String>, SupervisorError> {
        let execution = self.load_execution(execution_id).await?;
        let engine_id = execution
            .engine_execution_id
            .as_deref()
            .ok_or_else(|| SupervisorError::ExecutionNotFound(execution_id.to_string()))?;
        Ok(self.engine.sample_logs(engine_id).await?)
    }

    async fn load_execution(&self, execution_id: &str) -> Result<Execution, SupervisorError> {
        self.repo
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| SupervisorError::ExecutionNotFound(execution_id.to_string()))
    }

    async fn propagate(
        &self,
        execution: &Execution,
        action: EngineAction,
    ) -> Result<(), SupervisorError> {
        let Some(engine_id) = execution.engine_execution_id.as_deref() else {
            return Ok(());
        };
        let result = match action {
            EngineAction::Stop => self.engine.stop(engine_id).await,
            EngineAction::Pause => self.engine.pause(engine_id).await,
            EngineAction::Resume => self.engine.resume(engine_id).await,
        };
        result.map_err(SupervisorError::Engine)
    }
}

#[derive(Debug, Clone, Copy)]
enum EngineAction {
    Stop,
    Pause,
    Resume,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
