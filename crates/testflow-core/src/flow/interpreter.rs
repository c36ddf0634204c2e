//! The flow interpreter: recursive dispatch over a workflow's step tree.
//!
//! Public contract: given a [`Step`] and an [`ExecutionContext`], produce a
//! [`StepResult`]. Flow operators (`if`, `while`, `for`, `foreach`,
//! `parallel`, `retry`, `sleep`, `wait_until`) are composed from this single
//! dispatch function; leaf steps are handed to the [`LeafRegistry`]. The
//! interpreter owns cancellation checks at every block and iteration
//! boundary, break/continue propagation, and result recording.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use testflow_types::execution::{StepResult, StepStatus};
use testflow_types::workflow::{Step, StepConfig};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::expression::ExpressionEvaluator;
use super::leaf::{LeafError, LeafRegistry};
use super::signal::{FlowSignal, Interrupt, SeqOutcome};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Terminal errors of a whole run.
///
/// Step-level failures are ordinary [`StepResult`]s inside the context; this
/// error is what the run root reports to the engine hosting the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The run's cancellation token fired.
    #[error("execution cancelled")]
    Cancelled,

    /// A step failed and stopped the top-level block.
    #[error("step '{step_id}' failed: {message}")]
    StepFailed { step_id: String, message: String },
}

// ---------------------------------------------------------------------------
// FlowInterpreter
// ---------------------------------------------------------------------------

struct InterpreterInner {
    registry: LeafRegistry,
    evaluator: Box<dyn ExpressionEvaluator>,
}

/// Recursive step-tree interpreter.
///
/// Cheap to clone (shared inner); `parallel` clones it into branch tasks.
#[derive(Clone)]
pub struct FlowInterpreter {
    inner: Arc<InterpreterInner>,
}

impl FlowInterpreter {
    /// Create an interpreter over a leaf registry and an expression evaluator.
    pub fn new(registry: LeafRegistry, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        Self {
            inner: Arc::new(InterpreterInner {
                registry,
                evaluator: Box::new(evaluator),
            }),
        }
    }

    pub(crate) fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.inner.evaluator.as_ref()
    }

    /// Run a top-level step sequence to completion.
    ///
    /// Results land in `ctx`; a failing step surfaces as
    /// [`FlowError::StepFailed`]. A break/continue signal that no loop
    /// consumed ends the remaining steps of the run normally.
    pub async fn run(
        &self,
        steps: &[Step],
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        match self.run_sequence(steps, ctx, cancel).await {
            Ok(SeqOutcome::Completed) => Ok(()),
            Ok(SeqOutcome::Failed { step_id, error }) => Err(FlowError::StepFailed {
                step_id,
                message: error,
            }),
            Err(Interrupt::Signal(signal)) => {
                tracing::debug!(
                    label = signal.label(),
                    "control signal reached the run root; remaining steps skipped"
                );
                Ok(())
            }
            Err(Interrupt::Cancelled) => Err(FlowError::Cancelled),
        }
    }

    /// Boxed entry point for callers (e.g. `parallel` branch tasks) that need
    /// a concrete, `Send`-checkable future rather than a recursively-opaque
    /// one, since `execute` and `exec_parallel` call each other.
    pub(crate) fn execute_boxed<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<StepResult, Interrupt>> {
        Box::pin(self.execute(step, ctx, cancel))
    }

    /// Execute one step, dispatching on its config.
    pub(crate) async fn execute(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        tracing::debug!(
            step_id = step.id.as_str(),
            step_type = step.step_type.as_str(),
            "executing step"
        );

        match &step.config {
            StepConfig::Break { label } => Err(Interrupt::Signal(FlowSignal::Break {
                label: label.clone(),
            })),
            StepConfig::Continue { label } => Err(Interrupt::Signal(FlowSignal::Continue {
                label: label.clone(),
            })),
            StepConfig::If {
                condition,
                then_steps,
                else_ifs,
                else_steps,
            } => {
                self.exec_if(step, condition, then_steps, else_ifs, else_steps, ctx, cancel)
                    .await
            }
            StepConfig::While {
                condition,
                steps,
                label,
                max_iterations,
            } => {
                self.exec_while(step, condition, steps, label, *max_iterations, ctx, cancel)
                    .await
            }
            StepConfig::For {
                start,
                end,
                step: stride,
                index_var,
                steps,
                label,
            } => {
                self.exec_for(step, *start, *end, *stride, index_var, steps, label, ctx, cancel)
                    .await
            }
            StepConfig::Foreach {
                items,
                item_var,
                index_var,
                steps,
                label,
            } => {
                self.exec_foreach(
                    step,
                    items,
                    item_var,
                    index_var.as_deref(),
                    steps,
                    label,
                    ctx,
                    cancel,
                )
                .await
            }
            StepConfig::Parallel {
                steps,
                max_concurrent,
                fail_fast,
            } => {
                self.exec_parallel(step, steps, *max_concurrent, *fail_fast, ctx, cancel)
                    .await
            }
            StepConfig::Retry {
                steps,
                max_attempts,
                delay_ms,
                backoff,
                max_delay_ms,
            } => {
                self.exec_retry(
                    step,
                    steps,
                    *max_attempts,
                    *delay_ms,
                    *backoff,
                    *max_delay_ms,
                    ctx,
                    cancel,
                )
                .await
            }
            StepConfig::Sleep { duration_ms } => {
                self.exec_sleep(step, *duration_ms, cancel).await
            }
            StepConfig::WaitUntil {
                condition,
                timeout_ms,
                interval_ms,
            } => {
                self.exec_wait_until(step, condition, *timeout_ms, *interval_ms, ctx, cancel)
                    .await
            }
            StepConfig::Http { .. } | StepConfig::Script { .. } => {
                self.exec_leaf(step, ctx, cancel).await
            }
        }
    }

    /// Run sibling steps in declaration order.
    ///
    /// Shared per-step failure rule: every produced result is recorded in the
    /// context; a `failed`/`timeout` result abandons the rest of the block
    /// and surfaces as [`SeqOutcome::Failed`]. Signals and cancellation pass
    /// through untouched.
    pub(crate) fn run_sequence<'a>(
        &'a self,
        steps: &'a [Step],
        ctx: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<SeqOutcome, Interrupt>> {
        Box::pin(async move {
            for step in steps {
                if cancel.is_cancelled() {
                    return Err(Interrupt::Cancelled);
                }

                let result = self.execute(step, ctx, cancel).await?;
                let failed = result.status.is_failure();
                let error = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "step failed".to_string());
                ctx.record(result);

                if failed {
                    return Ok(SeqOutcome::Failed {
                        step_id: step.id.clone(),
                        error,
                    });
                }
            }
            Ok(SeqOutcome::Completed)
        })
    }

    /// Dispatch a leaf step to its registered executor.
    async fn exec_leaf(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let Some(executor) = self.inner.registry.get(step.step_type) else {
            return Ok(StepResult::failed(
                &step.id,
                0,
                format!(
                    "no executor registered for step type '{}'",
                    step.step_type.as_str()
                ),
            ));
        };

        let started = Instant::now();
        let outcome = tokio::select! {
            outcome = executor.execute(step, ctx, cancel) => outcome,
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => Ok(StepResult::success(&step.id, duration_ms, output)),
            Err(LeafError::Failed(message)) => {
                Ok(StepResult::failed(&step.id, duration_ms, message))
            }
            Err(LeafError::Timeout) => Ok(StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Timeout,
                duration_ms,
                output: serde_json::Value::Null,
                error: Some("step timed out".to_string()),
            }),
            Err(LeafError::Cancelled) => Err(Interrupt::Cancelled),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
