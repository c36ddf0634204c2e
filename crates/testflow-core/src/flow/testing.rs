//! Shared test fixtures for the flow interpreter: scripted leaf executors
//! and step-tree builders. Compiled only for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use testflow_types::workflow::{Step, StepConfig, StepType};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::expression::JexlEvaluator;
use super::interpreter::FlowInterpreter;
use super::leaf::{LeafError, LeafExecutor, LeafRegistry};

/// Leaf that records execution order and returns configured outputs.
#[derive(Default)]
pub(crate) struct ScriptedLeaf {
    executed: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
    outputs: Mutex<HashMap<String, Value>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedLeaf {
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub(crate) fn fail_on(&self, step_id: &str) {
        self.failures.lock().unwrap().push(step_id.to_string());
    }

    pub(crate) fn output_for(&self, step_id: &str, output: Value) {
        self.outputs
            .lock()
            .unwrap()
            .insert(step_id.to_string(), output);
    }

    pub(crate) fn delay_all(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

impl LeafExecutor for ScriptedLeaf {
    fn execute<'a>(
        &'a self,
        step: &'a Step,
        _ctx: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, LeafError>> {
        Box::pin(async move {
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(LeafError::Cancelled),
                }
            }
            self.executed.lock().unwrap().push(step.id.clone());
            if self.failures.lock().unwrap().contains(&step.id) {
                return Err(LeafError::Failed(format!("scripted failure in '{}'", step.id)));
            }
            let output = self
                .outputs
                .lock()
                .unwrap()
                .get(&step.id)
                .cloned()
                .unwrap_or_else(|| json!({ "ran": step.id }));
            Ok(output)
        })
    }
}

/// Leaf that fails the first `n` calls, then succeeds (or always times out).
pub(crate) struct FailNTimesLeaf {
    failures_left: AtomicU32,
    always_timeout: bool,
    calls: AtomicU32,
}

impl FailNTimesLeaf {
    pub(crate) fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            always_timeout: false,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn timeout_always() -> Self {
        Self {
            failures_left: AtomicU32::new(0),
            always_timeout: true,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LeafExecutor for FailNTimesLeaf {
    fn execute<'a>(
        &'a self,
        _step: &'a Step,
        _ctx: &'a mut ExecutionContext,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, LeafError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.always_timeout {
                return Err(LeafError::Timeout);
            }
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(LeafError::Failed("transient failure".to_string()));
            }
            Ok(json!("ok"))
        })
    }
}

/// Leaf that increments the integer variable named by the step's `source`
/// config field (a stand-in for a real script runtime's variable writes).
pub(crate) struct IncrementVarLeaf;

impl LeafExecutor for IncrementVarLeaf {
    fn execute<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, LeafError>> {
        Box::pin(async move {
            let StepConfig::Script { source, .. } = &step.config else {
                return Err(LeafError::Failed("not a script step".to_string()));
            };
            let var = source.as_str();
            let next = ctx.get_var(var).and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            ctx.set_var(var, json!(next));
            Ok(json!(next))
        })
    }
}

/// A script step whose `source` names the variable [`IncrementVarLeaf`] bumps.
pub(crate) fn increment_step(id: &str, var: &str) -> Step {
    Step {
        id: id.to_string(),
        name: String::new(),
        step_type: StepType::Script,
        config: StepConfig::Script {
            language: "javascript".to_string(),
            source: var.to_string(),
        },
    }
}

/// Build an interpreter with the given script-leaf executor registered.
pub(crate) fn interpreter_with(leaf: std::sync::Arc<ScriptedLeaf>) -> FlowInterpreter {
    let mut registry = LeafRegistry::new();
    registry.register(StepType::Script, leaf);
    FlowInterpreter::new(registry, JexlEvaluator::new())
}

/// A script leaf step with the given id.
pub(crate) fn script_step(id: &str) -> Step {
    Step {
        id: id.to_string(),
        name: String::new(),
        step_type: StepType::Script,
        config: StepConfig::Script {
            language: "javascript".to_string(),
            source: "return 1;".to_string(),
        },
    }
}
