//! The `parallel` operator: bounded fan-out over isolated branch contexts.
//!
//! Each child runs on its own task against a shallow copy of the parent
//! context, gated by a semaphore of `max_concurrent` permits. Completed
//! branch results merge into the parent context at a single point after each
//! join, which also refreshes the `parallel_results` variable, so `results`
//! and `parallel_results` are always consistent. With `fail_fast`, the first
//! failing child cancels the subtree token; siblings stop at their next
//! suspension point and already-completed results are kept.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use testflow_types::execution::{StepResult, StepStatus};
use testflow_types::workflow::Step;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::interpreter::FlowInterpreter;
use super::signal::Interrupt;

/// What one branch task reports back to the join loop.
enum BranchReport {
    Done(StepResult),
    Signalled,
    Cancelled,
}

impl FlowInterpreter {
    /// `parallel(steps, max_concurrent, fail_fast)`.
    pub(crate) async fn exec_parallel(
        &self,
        step: &Step,
        steps: &[Step],
        max_concurrent: usize,
        fail_fast: bool,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();
        let total = steps.len();
        let branch_cancel = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let mut join_set: JoinSet<BranchReport> = JoinSet::new();
        let mut task_steps: HashMap<tokio::task::Id, String> = HashMap::new();

        for child in steps.iter().cloned() {
            let interpreter = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = branch_cancel.clone();
            let mut branch_ctx = ctx.fork();
            let child_id = child.id.clone();

            let handle = join_set.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return BranchReport::Cancelled,
                    },
                    _ = token.cancelled() => return BranchReport::Cancelled,
                };

                match interpreter
                    .execute_boxed(&child, &mut branch_ctx, &token)
                    .await
                {
                    Ok(result) => BranchReport::Done(result),
                    Err(Interrupt::Signal(signal)) => {
                        tracing::debug!(
                            step_id = child.id.as_str(),
                            label = signal.label(),
                            "control signal ended parallel branch"
                        );
                        BranchReport::Signalled
                    }
                    Err(Interrupt::Cancelled) => BranchReport::Cancelled,
                }
            });
            task_steps.insert(handle.id(), child_id);
        }

        let mut results: HashMap<String, StepResult> = HashMap::new();
        let mut completed: u32 = 0;
        let mut failed: u32 = 0;
        let mut first_error: Option<String> = None;
        let mut fail_fast_hit = false;

        while let Some(joined) = join_set.join_next_with_id().await {
            let report = match joined {
                Ok((_, report)) => report,
                Err(join_error) => {
                    let step_id = task_steps
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or_default();
                    tracing::error!(
                        step_id = step_id.as_str(),
                        error = %join_error,
                        "parallel branch task aborted"
                    );
                    BranchReport::Done(StepResult::failed(
                        step_id,
                        started.elapsed().as_millis() as u64,
                        format!("branch task aborted: {join_error}"),
                    ))
                }
            };

            match report {
                BranchReport::Done(result) => {
                    let failure = result.status.is_failure();
                    if failure {
                        failed += 1;
                        if fail_fast && !fail_fast_hit {
                            fail_fast_hit = true;
                            first_error = Some(format!(
                                "step '{}' failed: {}",
                                result.step_id,
                                result.error.as_deref().unwrap_or("step failed")
                            ));
                            branch_cancel.cancel();
                        }
                    } else if result.status == StepStatus::Success {
                        completed += 1;
                    }
                    // Single merge point: branch result plus the refreshed
                    // parallel_results variable land together.
                    ctx.record(result.clone());
                    results.insert(result.step_id.clone(), result);
                    ctx.set_var(
                        "parallel_results",
                        serde_json::to_value(&results).unwrap_or(serde_json::Value::Null),
                    );
                }
                BranchReport::Signalled | BranchReport::Cancelled => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        let terminated_by = if fail_fast_hit { "fail_fast" } else { "completed" };
        let output = json!({
            "total": total,
            "completed": completed,
            "failed": failed,
            "terminated_by": terminated_by,
        });
        let duration_ms = started.elapsed().as_millis() as u64;

        if fail_fast_hit {
            Ok(StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                duration_ms,
                output,
                error: first_error,
            })
        } else {
            Ok(StepResult::success(&step.id, duration_ms, output))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
