//! Loop operators: `while`, `for`, and `foreach`.
//!
//! All three share the body-handling rule: a matching break/continue signal
//! is consumed here; a non-matching one re-propagates to the enclosing
//! operator; a failing body step fails the loop; cancellation is observed at
//! the top of every iteration.

use std::time::Instant;

use serde_json::json;
use testflow_types::execution::{StepResult, StepStatus};
use testflow_types::workflow::Step;
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::expression::resolve_reference;
use super::interpreter::FlowInterpreter;
use super::signal::{FlowSignal, Interrupt, SeqOutcome};

/// What one executed loop body asks the loop to do next.
enum BodyOutcome {
    /// Body completed; advance to the next iteration.
    Advance,
    /// A matching `break` was consumed; exit the loop normally.
    Exit,
    /// A body step failed; the loop fails.
    Failed { step_id: String, error: String },
    /// Signal for an outer loop, or cancellation; pass upward.
    Propagate(Interrupt),
}

impl FlowInterpreter {
    /// Run one loop body and classify the outcome against the loop's label.
    async fn run_loop_body(
        &self,
        steps: &[Step],
        label: &str,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> BodyOutcome {
        match self.run_sequence(steps, ctx, cancel).await {
            Ok(SeqOutcome::Completed) => BodyOutcome::Advance,
            Ok(SeqOutcome::Failed { step_id, error }) => BodyOutcome::Failed { step_id, error },
            Err(Interrupt::Signal(signal)) if signal.matches(label) => match signal {
                FlowSignal::Break { .. } => BodyOutcome::Exit,
                FlowSignal::Continue { .. } => BodyOutcome::Advance,
            },
            Err(other) => BodyOutcome::Propagate(other),
        }
    }

    /// `while(condition, steps, label?, max_iterations)`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn exec_while(
        &self,
        step: &Step,
        condition: &str,
        steps: &[Step],
        label: &str,
        max_iterations: u64,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();
        let mut iterations: u64 = 0;
        let terminated_by;

        loop {
            if cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            if iterations >= max_iterations {
                terminated_by = "max_iterations";
                break;
            }

            let proceed = match self.evaluator().eval_bool(condition, &ctx.snapshot()) {
                Ok(value) => value,
                Err(e) => {
                    return Ok(loop_failure(
                        step,
                        started,
                        iterations,
                        format!("condition evaluation failed: {e}"),
                    ));
                }
            };
            if !proceed {
                terminated_by = "condition";
                break;
            }

            match self.run_loop_body(steps, label, ctx, cancel).await {
                BodyOutcome::Advance => iterations += 1,
                BodyOutcome::Exit => {
                    iterations += 1;
                    terminated_by = "break";
                    break;
                }
                BodyOutcome::Failed { step_id, error } => {
                    return Ok(loop_failure(
                        step,
                        started,
                        iterations,
                        format!("step '{step_id}' failed: {error}"),
                    ));
                }
                BodyOutcome::Propagate(interrupt) => return Err(interrupt),
            }
        }

        Ok(StepResult::success(
            &step.id,
            started.elapsed().as_millis() as u64,
            json!({ "iterations": iterations, "terminated_by": terminated_by }),
        ))
    }

    /// `for(start, end, step, index_var, steps, label?)` over an inclusive range.
    ///
    /// A stride of `0` is treated as `1` (ascending).
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn exec_for(
        &self,
        step: &Step,
        start: i64,
        end: i64,
        stride: i64,
        index_var: &str,
        steps: &[Step],
        label: &str,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();
        let stride = if stride == 0 { 1 } else { stride };
        let mut index = start;
        let mut iterations: u64 = 0;
        let mut terminated_by = "completed";

        loop {
            if cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            let in_range = if stride > 0 { index <= end } else { index >= end };
            if !in_range {
                break;
            }

            ctx.set_var(index_var, json!(index));

            match self.run_loop_body(steps, label, ctx, cancel).await {
                BodyOutcome::Advance => {}
                BodyOutcome::Exit => {
                    iterations += 1;
                    terminated_by = "break";
                    break;
                }
                BodyOutcome::Failed { step_id, error } => {
                    return Ok(loop_failure(
                        step,
                        started,
                        iterations,
                        format!("step '{step_id}' failed: {error}"),
                    ));
                }
                BodyOutcome::Propagate(interrupt) => return Err(interrupt),
            }

            iterations += 1;
            index += stride;
        }

        Ok(StepResult::success(
            &step.id,
            started.elapsed().as_millis() as u64,
            json!({ "iterations": iterations, "terminated_by": terminated_by }),
        ))
    }

    /// `foreach(items, item_var, index_var?, steps, label?)`.
    ///
    /// `items` must be a `${name}` reference to a sequence-valued variable.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn exec_foreach(
        &self,
        step: &Step,
        items: &str,
        item_var: &str,
        index_var: Option<&str>,
        steps: &[Step],
        label: &str,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();

        let sequence = {
            let snapshot = ctx.snapshot();
            match resolve_reference(items, &snapshot) {
                Ok(serde_json::Value::Array(values)) => values.clone(),
                Ok(other) => {
                    return Ok(loop_failure(
                        step,
                        started,
                        0,
                        format!(
                            "items reference '{items}' did not resolve to a sequence (got {})",
                            value_kind(other)
                        ),
                    ));
                }
                Err(e) => {
                    return Ok(loop_failure(step, started, 0, e.to_string()));
                }
            }
        };

        let items_count = sequence.len();
        let mut iterations: u64 = 0;
        let mut terminated_by = "completed";

        for (position, item) in sequence.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }

            ctx.set_var(item_var, item);
            if let Some(index_var) = index_var {
                ctx.set_var(index_var, json!(position));
            }

            match self.run_loop_body(steps, label, ctx, cancel).await {
                BodyOutcome::Advance => iterations += 1,
                BodyOutcome::Exit => {
                    iterations += 1;
                    terminated_by = "break";
                    break;
                }
                BodyOutcome::Failed { step_id, error } => {
                    return Ok(loop_failure(
                        step,
                        started,
                        iterations,
                        format!("step '{step_id}' failed: {error}"),
                    ));
                }
                BodyOutcome::Propagate(interrupt) => return Err(interrupt),
            }
        }

        Ok(StepResult::success(
            &step.id,
            started.elapsed().as_millis() as u64,
            json!({
                "iterations": iterations,
                "items_count": items_count,
                "terminated_by": terminated_by,
            }),
        ))
    }
}

/// A failed loop result carrying the iteration count reached so far.
fn loop_failure(step: &Step, started: Instant, iterations: u64, error: String) -> StepResult {
    StepResult {
        step_id: step.id.clone(),
        status: StepStatus::Failed,
        duration_ms: started.elapsed().as_millis() as u64,
        output: json!({ "iterations": iterations }),
        error: Some(error),
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
