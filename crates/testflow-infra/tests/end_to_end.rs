//! Full-stack scenarios: supervisor + local engine + in-memory repositories,
//! wired exactly the way an embedded deployment would assemble them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use testflow_core::config::SupervisorConfig;
use testflow_core::environment::EnvironmentMerger;
use testflow_core::execution::ExecutionSupervisor;
use testflow_core::flow::{
    ExecutionContext, FlowInterpreter, JexlEvaluator, LeafError, LeafExecutor, LeafRegistry,
};
use testflow_core::fleet::FleetManager;
use testflow_core::repository::WorkflowRepository;
use testflow_infra::bindings::StaticBindingsProvider;
use testflow_infra::engine::LocalEngine;
use testflow_infra::memory::{InMemoryExecutorRepository, InMemoryWorkflowRepository};
use testflow_types::environment::{Environment, EnvironmentBindings, VariableBinding, VariableType};
use testflow_types::execution::{ExecutionMode, ExecutionStatus};
use testflow_types::executor::DispatchStrategy;
use testflow_types::workflow::{
    FlowDefinition, Step, StepConfig, StepType, Workflow, WorkflowStatus, WorkflowType,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testflow=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Script leaf understanding `incr <var>` and `sleep <ms>`.
struct CounterLeaf;

impl LeafExecutor for CounterLeaf {
    fn execute<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, LeafError>> {
        Box::pin(async move {
            let StepConfig::Script { source, .. } = &step.config else {
                return Err(LeafError::Failed("not a script step".to_string()));
            };
            if let Some(var) = source.strip_prefix("incr ") {
                let next = ctx.get_var(var).and_then(|v| v.as_i64()).unwrap_or(0) + 1;
                ctx.set_var(var, json!(next));
                return Ok(json!(next));
            }
            if let Some(ms) = source.strip_prefix("sleep ") {
                let ms: u64 = ms.parse().unwrap_or(0);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                    _ = cancel.cancelled() => return Err(LeafError::Cancelled),
                }
            }
            Ok(json!(source))
        })
    }
}

type Stack = ExecutionSupervisor<
    InMemoryWorkflowRepository,
    InMemoryExecutorRepository,
    LocalEngine,
    StaticBindingsProvider,
    EnvironmentMerger,
>;

struct Fixture {
    supervisor: Stack,
    repo: Arc<InMemoryWorkflowRepository>,
    workflow_id: Uuid,
    env_id: Uuid,
}

async fn fixture(steps: Vec<Step>) -> Fixture {
    let mut registry = LeafRegistry::new();
    registry.register(StepType::Script, Arc::new(CounterLeaf));
    let interpreter = FlowInterpreter::new(registry, JexlEvaluator::new());

    let repo = Arc::new(InMemoryWorkflowRepository::new());
    let executors = Arc::new(InMemoryExecutorRepository::new());
    let engine = Arc::new(LocalEngine::new(interpreter));
    let bindings = Arc::new(StaticBindingsProvider::new());

    let project_id = Uuid::now_v7();
    let workflow = Workflow {
        id: Uuid::now_v7(),
        project_id,
        name: "end-to-end".to_string(),
        version: 1,
        definition: FlowDefinition {
            variables: [("i".to_string(), json!(0))].into_iter().collect(),
            steps,
            env: None,
        },
        workflow_type: WorkflowType::DataGeneration,
        executor_config: DispatchStrategy::Local,
        status: WorkflowStatus::Enabled,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let workflow_id = workflow.id;
    repo.save_workflow(&workflow).await.unwrap();

    let env = Environment {
        id: Uuid::now_v7(),
        project_id,
        name: "staging".to_string(),
        created_at: Utc::now(),
    };
    let env_id = env.id;
    bindings.insert(
        env,
        EnvironmentBindings {
            domains: vec![],
            variables: vec![VariableBinding {
                name: "limit".to_string(),
                key: "limit".to_string(),
                value: json!(3),
                var_type: VariableType::Number,
                is_sensitive: false,
                description: String::new(),
            }],
            db_configs: vec![],
            mq_configs: vec![],
        },
    );

    let fleet = FleetManager::new(Arc::clone(&executors), Arc::clone(&engine));
    let supervisor = ExecutionSupervisor::new(
        Arc::clone(&repo),
        fleet,
        engine,
        bindings,
        EnvironmentMerger,
        SupervisorConfig {
            poll_interval_ms: 10,
            ..Default::default()
        },
    );

    Fixture {
        supervisor,
        repo,
        workflow_id,
        env_id,
    }
}

fn script(id: &str, source: &str) -> Step {
    Step {
        id: id.to_string(),
        name: String::new(),
        step_type: StepType::Script,
        config: StepConfig::Script {
            language: "javascript".to_string(),
            source: source.to_string(),
        },
    }
}

async fn wait_for_status(
    repo: &InMemoryWorkflowRepository,
    execution_id: &str,
    status: ExecutionStatus,
) {
    for _ in 0..500 {
        let execution = repo
            .get_execution(execution_id)
            .await
            .unwrap()
            .expect("execution exists");
        if execution.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution never reached {status:?}");
}

#[tokio::test]
async fn submitted_loop_workflow_runs_to_completion() {
    init_tracing();
    // while (i < limit) { i <- i + 1 }, with `limit` injected from the
    // environment bindings.
    let steps = vec![Step {
        id: "count-up".to_string(),
        name: String::new(),
        step_type: StepType::While,
        config: StepConfig::While {
            condition: "variables.i < variables.limit".to_string(),
            steps: vec![script("bump", "incr i")],
            label: String::new(),
            max_iterations: 1000,
        },
    }];
    let fx = fixture(steps).await;

    let execution = fx
        .supervisor
        .submit(fx.workflow_id, fx.env_id, Some(ExecutionMode::Execute))
        .await
        .unwrap();

    wait_for_status(&fx.repo, &execution.execution_id, ExecutionStatus::Completed).await;

    let finished = fx
        .repo
        .get_execution(&execution.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert!(finished.duration_ms.is_some());
    assert_eq!(finished.failed_steps, 0);
    // Loop step + bump leaf both recorded.
    assert_eq!(finished.total_steps, 2);

    let results = &finished.result.unwrap()["results"];
    assert_eq!(results["count-up"]["output"]["iterations"], json!(3));
    assert_eq!(
        results["count-up"]["output"]["terminated_by"],
        json!("condition")
    );

    let logs = fx
        .supervisor
        .sample_logs(&execution.execution_id)
        .await
        .unwrap();
    assert!(logs.iter().any(|line| line.contains("count-up")));
}

#[tokio::test]
async fn stop_cancels_a_running_workflow() {
    init_tracing();
    let fx = fixture(vec![script("long", "sleep 60000")]).await;

    let execution = fx
        .supervisor
        .submit(fx.workflow_id, fx.env_id, None)
        .await
        .unwrap();

    // Let the run start, then stop it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.supervisor.stop(&execution.execution_id).await.unwrap();

    wait_for_status(&fx.repo, &execution.execution_id, ExecutionStatus::Stopped).await;

    // The monitor records terminal bookkeeping once the engine reports the
    // stop; wait for it rather than racing it.
    for _ in 0..500 {
        let stopped = fx
            .repo
            .get_execution(&execution.execution_id)
            .await
            .unwrap()
            .unwrap();
        if stopped.end_time.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("stopped execution never finalized");
}

#[tokio::test]
async fn failing_workflow_is_marked_failed_with_counters() {
    init_tracing();
    let steps = vec![
        script("ok", "noop"),
        Step {
            id: "wrap".to_string(),
            name: String::new(),
            step_type: StepType::Retry,
            config: StepConfig::Retry {
                steps: vec![Step {
                    id: "orphan-http".to_string(),
                    name: String::new(),
                    step_type: StepType::Http,
                    config: StepConfig::Http {
                        method: "GET".to_string(),
                        url: "/nope".to_string(),
                        domain: None,
                        headers: None,
                        body: None,
                        timeout_ms: None,
                    },
                }],
                max_attempts: 2,
                delay_ms: 10,
                backoff: Default::default(),
                max_delay_ms: None,
            },
        },
    ];
    // No HTTP leaf executor registered: the http step fails, retry exhausts,
    // and the run fails.
    let fx = fixture(steps).await;

    let execution = fx
        .supervisor
        .submit(fx.workflow_id, fx.env_id, None)
        .await
        .unwrap();

    wait_for_status(&fx.repo, &execution.execution_id, ExecutionStatus::Failed).await;
    let failed = fx
        .repo
        .get_execution(&execution.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert!(failed.failed_steps >= 1);
    assert!(failed.success_steps >= 1);

    let results = &failed.result.unwrap()["results"];
    assert_eq!(results["wrap"]["output"]["attempts"], json!(2));
    assert_eq!(results["wrap"]["output"]["terminated_by"], json!("max_attempts"));
}
