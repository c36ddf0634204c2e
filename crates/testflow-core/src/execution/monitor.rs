//! Background execution monitor: polls the engine at a fixed cadence and
//! drives the persisted execution record to a terminal state.
//!
//! One monitor task exists per execution. The loop survives poll failures
//! (only the poll retries), ignores engine states it does not recognize, and
//! is bounded by a per-workflow-type ceiling. Panics inside the monitor are
//! recovered: the execution is marked failed and the host process keeps
//! running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use serde_json::json;
use testflow_types::execution::ExecutionStatus;

use crate::repository::WorkflowRepository;
use crate::engine::EngineClient;

/// Parameters for one monitor task.
#[derive(Debug, Clone)]
pub(crate) struct MonitorParams {
    pub execution_id: String,
    pub engine_execution_id: String,
    pub poll_interval: Duration,
    pub ceiling: Duration,
}

/// Spawn the monitor task for an execution.
///
/// The loop body runs under `catch_unwind`; a panic marks the execution
/// failed instead of taking the process down.
pub(crate) fn spawn_monitor<R, E>(
    repo: Arc<R>,
    engine: Arc<E>,
    params: MonitorParams,
) -> tokio::task::JoinHandle<()>
where
    R: WorkflowRepository + 'static,
    E: EngineClient + 'static,
{
    tokio::spawn(async move {
        let execution_id = params.execution_id.clone();
        let outcome = std::panic::AssertUnwindSafe(monitor_loop(
            Arc::clone(&repo),
            engine,
            params,
        ))
        .catch_unwind()
        .await;

        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                execution_id = execution_id.as_str(),
                panic = message.as_str(),
                "execution monitor panicked; marking execution failed"
            );
            let _ = repo
                .transition_execution(&execution_id, ExecutionStatus::Failed)
                .await;
            let _ = repo
                .finalize_execution(
                    &execution_id,
                    Utc::now(),
                    Some(&json!({ "error": format!("monitor panicked: {message}") })),
                    0,
                    0,
                    0,
                )
                .await;
        }
    })
}

async fn monitor_loop<R, E>(repo: Arc<R>, engine: Arc<E>, params: MonitorParams)
where
    R: WorkflowRepository,
    E: EngineClient,
{
    let started = Instant::now();
    let mut ticker = tokio::time::interval(params.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if started.elapsed() >= params.ceiling {
            tracing::warn!(
                execution_id = params.execution_id.as_str(),
                ceiling_secs = params.ceiling.as_secs(),
                "monitor ceiling reached; marking execution failed"
            );
            let _ = repo
                .transition_execution(&params.execution_id, ExecutionStatus::Failed)
                .await;
            let _ = repo
                .finalize_execution(
                    &params.execution_id,
                    Utc::now(),
                    Some(&json!({
                        "error": format!(
                            "monitoring timed out after {} s",
                            params.ceiling.as_secs()
                        )
                    })),
                    0,
                    0,
                    0,
                )
                .await;
            return;
        }

        let snapshot = match engine.status(&params.engine_execution_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(
                    execution_id = params.execution_id.as_str(),
                    error = %error,
                    "status poll failed; retrying"
                );
                continue;
            }
        };

        let Some(mapped) = snapshot.state.to_execution_status() else {
            tracing::debug!(
                execution_id = params.execution_id.as_str(),
                state = ?snapshot.state,
                "ignoring unrecognized engine state"
            );
            continue;
        };

        match mapped {
            ExecutionStatus::Pending => {}
            ExecutionStatus::Running | ExecutionStatus::Paused => {
                // Tracks pause/resume driven from the engine side; repeats
                // and races with operator actions are benign.
                let _ = repo
                    .transition_execution(&params.execution_id, mapped)
                    .await;
            }
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped => {
                let _ = repo
                    .transition_execution(&params.execution_id, mapped)
                    .await;
                let end_time = snapshot.end_time.unwrap_or_else(Utc::now);
                let _ = repo
                    .finalize_execution(
                        &params.execution_id,
                        end_time,
                        snapshot.result.as_ref(),
                        snapshot.total_steps,
                        snapshot.success_steps,
                        snapshot.failed_steps,
                    )
                    .await;
                tracing::info!(
                    execution_id = params.execution_id.as_str(),
                    status = ?mapped,
                    "execution reached terminal state"
                );
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::testing::{FakeRepo, StubEngine, pending_execution, running, snapshot};
    use testflow_types::execution::EngineState;

    fn params(execution_id: &str, poll_ms: u64, ceiling: Duration) -> MonitorParams {
        MonitorParams {
            execution_id: execution_id.to_string(),
            engine_execution_id: format!("eng-{execution_id}"),
            poll_interval: Duration::from_millis(poll_ms),
            ceiling,
        }
    }

    async fn seeded_repo(execution_id: &str) -> Arc<FakeRepo> {
        let repo = Arc::new(FakeRepo::default());
        repo.create_execution(&pending_execution(execution_id))
            .await
            .unwrap();
        repo.transition_execution(execution_id, ExecutionStatus::Running)
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_monitor_finalizes_on_completed() {
        let repo = seeded_repo("x1").await;
        let engine = Arc::new(StubEngine::new(vec![
            running(),
            snapshot(EngineState::Completed),
        ]));

        spawn_monitor(
            Arc::clone(&repo),
            engine,
            params("x1", 5, Duration::from_secs(60)),
        )
        .await
        .unwrap();

        let execution = repo.get_execution("x1").await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.end_time.is_some());
        assert!(execution.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_monitor_maps_aborted_to_stopped() {
        let repo = seeded_repo("x2").await;
        let engine = Arc::new(StubEngine::new(vec![snapshot(EngineState::Aborted)]));

        spawn_monitor(
            Arc::clone(&repo),
            engine,
            params("x2", 5, Duration::from_secs(60)),
        )
        .await
        .unwrap();

        let execution = repo.get_execution("x2").await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Stopped);
    }

    #[tokio::test]
    async fn test_monitor_ignores_unknown_states_and_poll_errors() {
        let repo = seeded_repo("x3").await;
        // Two unrecognized states, then completed.
        let engine = Arc::new(StubEngine::new(vec![
            snapshot(EngineState::Unknown),
            snapshot(EngineState::Unknown),
            snapshot(EngineState::Completed),
        ]));

        spawn_monitor(
            Arc::clone(&repo),
            engine,
            params("x3", 5, Duration::from_secs(60)),
        )
        .await
        .unwrap();

        let execution = repo.get_execution("x3").await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_monitor_ceiling_marks_failed() {
        let repo = seeded_repo("x4").await;
        // Engine forever reports running.
        let engine = Arc::new(StubEngine::new(vec![running()]));

        spawn_monitor(
            Arc::clone(&repo),
            engine,
            params("x4", 5, Duration::from_millis(30)),
        )
        .await
        .unwrap();

        let execution = repo.get_execution("x4").await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(
            execution.result.unwrap()["error"]
                .as_str()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn test_monitor_recovers_from_panic() {
        let repo = seeded_repo("x5").await;
        let engine = Arc::new(StubEngine::new(vec![running()]));
        engine.panic_on_status();

        // The spawned task completes normally despite the panic inside.
        spawn_monitor(
            Arc::clone(&repo),
            engine,
            params("x5", 5, Duration::from_secs(60)),
        )
        .await
        .unwrap();

        let execution = repo.get_execution("x5").await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(
            execution.result.unwrap()["error"]
                .as_str()
                .unwrap()
                .contains("monitor panicked")
        );
    }

    #[tokio::test]
    async fn test_monitor_tracks_engine_driven_pause() {
        let repo = seeded_repo("x6").await;
        let engine = Arc::new(StubEngine::new(vec![
            snapshot(EngineState::Paused),
            snapshot(EngineState::Running),
            snapshot(EngineState::Completed),
        ]));

        spawn_monitor(
            Arc::clone(&repo),
            engine,
            params("x6", 5, Duration::from_secs(60)),
        )
        .await
        .unwrap();

        let execution = repo.get_execution("x6").await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }
}
