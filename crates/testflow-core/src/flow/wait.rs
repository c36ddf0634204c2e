//! Timing operators: `sleep` and `wait_until`.
//!
//! Both wait cooperatively: cancellation interrupts the wait immediately and
//! surfaces upward instead of completing the step.

use std::time::Duration;

use tokio::time::Instant;

use serde_json::json;
use testflow_types::execution::{StepResult, StepStatus};
use testflow_types::workflow::Step;
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::interpreter::FlowInterpreter;
use super::signal::Interrupt;

impl FlowInterpreter {
    /// `sleep(duration)`: return after the duration, or immediately on
    /// cancellation. Reports requested vs actually elapsed time.
    pub(crate) async fn exec_sleep(
        &self,
        step: &Step,
        duration_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(duration_ms)) => {}
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(StepResult::success(
            &step.id,
            elapsed_ms,
            json!({ "requested_ms": duration_ms, "elapsed_ms": elapsed_ms }),
        ))
    }

    /// `wait_until(condition, timeout, interval)`: poll the condition until
    /// it holds or the deadline passes.
    pub(crate) async fn exec_wait_until(
        &self,
        step: &Step,
        condition: &str,
        timeout_ms: u64,
        interval_ms: u64,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(timeout_ms);
        let mut attempts: u64 = 0;
        let terminated_by;

        loop {
            if cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }

            attempts += 1;
            match self.evaluator().eval_bool(condition, &ctx.snapshot()) {
                Ok(true) => {
                    terminated_by = "condition_met";
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    return Ok(StepResult::failed(
                        &step.id,
                        started.elapsed().as_millis() as u64,
                        format!("condition evaluation failed: {e}"),
                    ));
                }
            }

            if Instant::now() >= deadline {
                terminated_by = "timeout";
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
                _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let output = json!({
            "attempts": attempts,
            "elapsed_ms": elapsed_ms,
            "terminated_by": terminated_by,
        });

        if terminated_by == "condition_met" {
            Ok(StepResult::success(&step.id, elapsed_ms, output))
        } else {
            Ok(StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Timeout,
                duration_ms: elapsed_ms,
                output,
                error: Some(format!(
                    "condition not met within {timeout_ms} ms ({attempts} attempts)"
                )),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
