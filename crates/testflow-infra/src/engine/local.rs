//! Local engine: hosts the flow interpreter in-process.
//!
//! `submit` spawns the run on its own task and tracks it in a concurrent
//! map; `stop` fires the run's cancellation token. Pause/resume are remote
//! runner capabilities and are rejected here.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use testflow_core::engine::{EngineClient, SubmitRequest};
use testflow_core::flow::{ExecutionContext, FlowError, FlowInterpreter};
use testflow_types::error::EngineError;
use testflow_types::execution::{EngineState, EngineStatusSnapshot, StepStatus};
use testflow_types::executor::RuntimeStatus;
use tokio_util::sync::CancellationToken;

struct RunState {
    cancel: CancellationToken,
    snapshot: EngineStatusSnapshot,
}

/// In-process engine around a [`FlowInterpreter`].
pub struct LocalEngine {
    interpreter: FlowInterpreter,
    runs: Arc<DashMap<String, RunState>>,
}

impl LocalEngine {
    pub fn new(interpreter: FlowInterpreter) -> Self {
        Self {
            interpreter,
            runs: Arc::new(DashMap::new()),
        }
    }
}

impl EngineClient for LocalEngine {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, EngineError> {
        let engine_execution_id = request.execution_id.clone();
        let cancel = CancellationToken::new();

        self.runs.insert(
            engine_execution_id.clone(),
            RunState {
                cancel: cancel.clone(),
                snapshot: EngineStatusSnapshot {
                    state: EngineState::Running,
                    start_time: Some(Utc::now()),
                    end_time: None,
                    result: None,
                    total_steps: 0,
                    success_steps: 0,
                    failed_steps: 0,
                },
            },
        );

        let interpreter = self.interpreter.clone();
        let runs = Arc::clone(&self.runs);
        let definition = request.definition.clone();
        let run_id = engine_execution_id.clone();
        let workflow_name = request.workflow_name.clone();

        tokio::spawn(async move {
            tracing::info!(
                run_id = run_id.as_str(),
                workflow = workflow_name.as_str(),
                "starting local run"
            );

            let mut ctx = ExecutionContext::seeded(&definition.variables)
                .with_environment(definition.env.clone());
            let outcome = interpreter.run(&definition.steps, &mut ctx, &cancel).await;

            let total = ctx.results.len() as u32;
            let success = ctx
                .results
                .values()
                .filter(|r| r.status == StepStatus::Success)
                .count() as u32;
            let failed = ctx
                .results
                .values()
                .filter(|r| r.status.is_failure())
                .count() as u32;

            let (state, error) = match outcome {
                Ok(()) => (EngineState::Completed, None),
                Err(FlowError::Cancelled) => (EngineState::Stopped, None),
                Err(e @ FlowError::StepFailed { .. }) => {
                    (EngineState::Failed, Some(e.to_string()))
                }
            };

            if let Some(mut entry) = runs.get_mut(&run_id) {
                entry.snapshot.state = state;
                entry.snapshot.end_time = Some(Utc::now());
                entry.snapshot.total_steps = total;
                entry.snapshot.success_steps = success;
                entry.snapshot.failed_steps = failed;
                entry.snapshot.result = Some(json!({
                    "error": error,
                    "results": ctx.results,
                }));
            }

            tracing::info!(run_id = run_id.as_str(), state = ?state, "local run finished");
        });

        Ok(engine_execution_id)
    }

    async fn status(&self, engine_execution_id: &str) -> Result<EngineStatusSnapshot, EngineError> {
        self.runs
            .get(engine_execution_id)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| EngineError::ExecutionNotFound(engine_execution_id.to_string()))
    }

    async fn stop(&self, engine_execution_id: &str) -> Result<(), EngineError> {
        let entry = self
            .runs
            .get(engine_execution_id)
            .ok_or_else(|| EngineError::ExecutionNotFound(engine_execution_id.to_string()))?;
        entry.cancel.cancel();
        Ok(())
    }

    async fn pause(&self, engine_execution_id: &str) -> Result<(), EngineError> {
        let _ = engine_execution_id;
        Err(EngineError::Unsupported(
            "pause requires a remote runner".to_string(),
        ))
    }

    async fn resume(&self, engine_execution_id: &str) -> Result<(), EngineError> {
        let _ = engine_execution_id;
        Err(EngineError::Unsupported(
            "resume requires a remote runner".to_string(),
        ))
    }

    async fn sample_logs(&self, engine_execution_id: &str) -> Result<Vec<String>, EngineError> {
        let entry = self
            .runs
            .get(engine_execution_id)
            .ok_or_else(|| EngineError::ExecutionNotFound(engine_execution_id.to_string()))?;

        let mut lines = vec![format!("run {engine_execution_id}: {:?}", entry.snapshot.state)];
        if let Some(results) = entry
            .snapshot
            .result
            .as_ref()
            .and_then(|r| r.get("results"))
            .and_then(|r| r.as_object())
        {
            for (step_id, result) in results {
                lines.push(format!(
                    "step {step_id}: {} ({} ms)",
                    result["status"].as_str().unwrap_or("?"),
                    result["duration_ms"].as_u64().unwrap_or(0),
                ));
            }
        }
        Ok(lines)
    }

    async fn list_workers(&self) -> Result<Vec<RuntimeStatus>, EngineError> {
        // The local engine runs on the submitting host; it has no fleet.
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
