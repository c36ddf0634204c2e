//! Shared test fixtures for the execution supervisor and monitor: an
//! in-memory repository, a scriptable engine stub, and a static bindings
//! provider. Compiled only for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use serde_json::json;
use testflow_types::environment::{Environment, EnvironmentBindings};
use testflow_types::error::{EngineError, RepositoryError};
use testflow_types::execution::{
    EngineState, EngineStatusSnapshot, Execution, ExecutionMode, ExecutionStatus,
};
use testflow_types::executor::{ExecutorRecord, RuntimeStatus, WorkerState};
use testflow_types::workflow::Workflow;
use uuid::Uuid;

use crate::engine::{EngineClient, SubmitRequest};
use crate::environment::BindingsProvider;
use crate::repository::{ExecutorRepository, WorkflowRepository};

// ---------------------------------------------------------------------------
// Snapshot builders
// ---------------------------------------------------------------------------

pub(crate) fn snapshot(state: EngineState) -> EngineStatusSnapshot {
    let terminal = matches!(
        state,
        EngineState::Completed | EngineState::Failed | EngineState::Aborted | EngineState::Stopped
    );
    EngineStatusSnapshot {
        state,
        start_time: Some(Utc::now()),
        end_time: terminal.then(Utc::now),
        result: terminal.then(|| json!({ "summary": "done" })),
        total_steps: if terminal { 3 } else { 0 },
        success_steps: if terminal { 3 } else { 0 },
        failed_steps: 0,
    }
}

pub(crate) fn running() -> EngineStatusSnapshot {
    snapshot(EngineState::Running)
}

pub(crate) fn terminal() -> EngineStatusSnapshot {
    snapshot(EngineState::Completed)
}

pub(crate) fn pending_execution(execution_id: &str) -> Execution {
    Execution {
        execution_id: execution_id.to_string(),
        workflow_id: Uuid::now_v7(),
        env_id: Uuid::now_v7(),
        executor_id: None,
        engine_execution_id: Some(format!("eng-{execution_id}")),
        mode: ExecutionMode::Execute,
        status: ExecutionStatus::Pending,
        start_time: Utc::now(),
        end_time: None,
        duration_ms: None,
        total_steps: 0,
        success_steps: 0,
        failed_steps: 0,
        result: None,
    }
}

pub(crate) fn online_worker(slave_id: &str, load: f64) -> RuntimeStatus {
    RuntimeStatus {
        slave_id: slave_id.to_string(),
        address: "127.0.0.1:7700".to_string(),
        state: WorkerState::Online,
        load,
        active_tasks: 0,
        current_vus: 0,
        last_seen: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// FakeRepo
// ---------------------------------------------------------------------------

/// In-memory repository implementing both repository traits.
#[derive(Default)]
pub(crate) struct FakeRepo {
    workflows: Mutex<HashMap<Uuid, Workflow>>,
    executions: Mutex<HashMap<String, Execution>>,
    executors: Mutex<HashMap<String, ExecutorRecord>>,
}

impl FakeRepo {
    pub(crate) fn execution_count(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    pub(crate) fn all_executions(&self) -> Vec<Execution> {
        self.executions.lock().unwrap().values().cloned().collect()
    }
}

impl WorkflowRepository for FakeRepo {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows
            .lock()
            .unwrap()
            .insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.lock().unwrap().get(id).cloned())
    }

    async fn list_workflows(
        &self,
        project_id: Option<&Uuid>,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .values()
            .filter(|w| project_id.is_none_or(|p| &w.project_id == p))
            .cloned()
            .collect())
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.workflows.lock().unwrap().remove(id).is_some())
    }

    async fn create_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        if executions.contains_key(&execution.execution_id) {
            return Err(RepositoryError::Conflict(execution.execution_id.clone()));
        }
        executions.insert(execution.execution_id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>, RepositoryError> {
        Ok(self.executions.lock().unwrap().get(execution_id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let mut executions: Vec<Execution> = self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| &e.workflow_id == workflow_id)
            .cloned()
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
        let mut executions = self.executions.lock().unwrap();
        let execution = executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        if execution.status == to {
            return Ok(false);
        }
        if !execution.status.can_transition(to) {
            return Err(RepositoryError::IllegalTransition(format!(
                "{:?} -> {:?}",
                execution.status, to
            )));
        }
        execution.status = to;
        Ok(true)
    }

    async fn set_engine_execution_id(
        &self,
        execution_id: &str,
        engine_execution_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        execution.engine_execution_id = Some(engine_execution_id.to_string());
        Ok(())
    }

    async fn finalize_execution(
        &self,
        execution_id: &str,
        end_time: chrono::DateTime<Utc>,
        result: Option<&serde_json::Value>,
        total_steps: u32,
        success_steps: u32,
        failed_steps: u32,
    ) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions
            .get_mut(execution_id)
            .ok_or(RepositoryError::NotFound)?;
        execution.end_time = Some(end_time);
        execution.duration_ms =
            Some((end_time - execution.start_time).num_milliseconds().max(0) as u64);
        execution.result = result.cloned();
        execution.total_steps = total_steps;
        execution.success_steps = success_steps;
        execution.failed_steps = failed_steps;
        Ok(())
    }
}

impl ExecutorRepository for FakeRepo {
    async fn upsert(&self, record: &ExecutorRecord) -> Result<(), RepositoryError> {
        self.executors
            .lock()
            .unwrap()
            .insert(record.slave_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, slave_id: &str) -> Result<Option<ExecutorRecord>, RepositoryError> {
        Ok(self.executors.lock().unwrap().get(slave_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ExecutorRecord>, RepositoryError> {
        Ok(self.executors.lock().unwrap().values().cloned().collect())
    }

    async fn delete(&self, slave_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.executors.lock().unwrap().remove(slave_id).is_some())
    }
}

// ---------------------------------------------------------------------------
// StubEngine
// ---------------------------------------------------------------------------

/// Scriptable engine stub.
///
/// `status` walks the scripted snapshot sequence (the last entry repeats)
/// unless an operator action has set a state override; `stop`/`pause`/
/// `resume` record themselves and override the reported state the way a real
/// engine would.
#[derive(Default)]
pub(crate) struct StubEngine {
    statuses: Mutex<Vec<EngineStatusSnapshot>>,
    cursor: AtomicUsize,
    submit_error: Mutex<Option<String>>,
    last_submit: Mutex<Option<SubmitRequest>>,
    actions: Mutex<Vec<&'static str>>,
    state_override: Mutex<Option<EngineState>>,
    workers: Mutex<Vec<RuntimeStatus>>,
    panic_on_status: AtomicBool,
}

impl StubEngine {
    pub(crate) fn new(statuses: Vec<EngineStatusSnapshot>) -> Self {
        Self {
            statuses: Mutex::new(statuses),
            ..Default::default()
        }
    }

    pub(crate) fn fail_submit(&self, message: &str) {
        *self.submit_error.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn last_submit(&self) -> Option<SubmitRequest> {
        self.last_submit.lock().unwrap().clone()
    }

    pub(crate) fn actions(&self) -> Vec<&'static str> {
        self.actions.lock().unwrap().clone()
    }

    pub(crate) fn set_workers(&self, workers: Vec<RuntimeStatus>) {
        *self.workers.lock().unwrap() = workers;
    }

    pub(crate) fn panic_on_status(&self) {
        self.panic_on_status.store(true, Ordering::SeqCst);
    }
}

impl EngineClient for StubEngine {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, EngineError> {
        *self.last_submit.lock().unwrap() = Some(request.clone());
        if let Some(message) = self.submit_error.lock().unwrap().clone() {
            return Err(EngineError::Rejected(message));
        }
        Ok(format!("eng-{}", request.execution_id))
    }

    async fn status(&self, _id: &str) -> Result<EngineStatusSnapshot, EngineError> {
        if self.panic_on_status.load(Ordering::SeqCst) {
            panic!("status poll exploded");
        }
        if let Some(state) = *self.state_override.lock().unwrap() {
            return Ok(snapshot(state));
        }
        let statuses = self.statuses.lock().unwrap();
        if statuses.is_empty() {
            return Err(EngineError::Transport("no status scripted".to_string()));
        }
        let index = self
            .cursor
            .fetch_add(1, Ordering::SeqCst)
            .min(statuses.len() - 1);
        Ok(statuses[index].clone())
    }

    async fn stop(&self, _id: &str) -> Result<(), EngineError> {
        self.actions.lock().unwrap().push("stop");
        *self.state_override.lock().unwrap() = Some(EngineState::Stopped);
        Ok(())
    }

    async fn pause(&self, _id: &str) -> Result<(), EngineError> {
        self.actions.lock().unwrap().push("pause");
        *self.state_override.lock().unwrap() = Some(EngineState::Paused);
        Ok(())
    }

    async fn resume(&self, _id: &str) -> Result<(), EngineError> {
        self.actions.lock().unwrap().push("resume");
        *self.state_override.lock().unwrap() = Some(EngineState::Running);
        Ok(())
    }

    async fn sample_logs(&self, id: &str) -> Result<Vec<String>, EngineError> {
        Ok(vec![format!("log sample for {id}")])
    }

    async fn list_workers(&self) -> Result<Vec<RuntimeStatus>, EngineError> {
        Ok(self.workers.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// FakeBindings
// ---------------------------------------------------------------------------

/// Bindings provider serving a single environment.
pub(crate) struct FakeBindings {
    env: Environment,
    bindings: EnvironmentBindings,
}

impl FakeBindings {
    pub(crate) fn new(env: Environment, bindings: EnvironmentBindings) -> Self {
        Self { env, bindings }
    }
}

impl BindingsProvider for FakeBindings {
    async fn environment(&self, env_id: &Uuid) -> Result<Option<Environment>, RepositoryError> {
        Ok((env_id == &self.env.id).then(|| self.env.clone()))
    }

    async fn bindings(&self, env_id: &Uuid) -> Result<EnvironmentBindings, RepositoryError> {
        if env_id == &self.env.id {
            Ok(self.bindings.clone())
        } else {
            Ok(EnvironmentBindings::default())
        }
    }
}
