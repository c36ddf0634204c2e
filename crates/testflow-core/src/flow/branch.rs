//! The `if` / `else_if` / `else` operator.

use std::time::Instant;

use serde_json::json;
use testflow_types::execution::{StepResult, StepStatus};
use testflow_types::workflow::{ElseIfBranch, Step};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::interpreter::FlowInterpreter;
use super::signal::{Interrupt, SeqOutcome};

impl FlowInterpreter {
    /// Evaluate the condition chain and run the first matching branch.
    ///
    /// Branch order: top condition, each `else_if` in declaration order,
    /// then `else`. The result records which branch was taken and its index;
    /// sub-step results are written back into the enclosing context.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn exec_if(
        &self,
        step: &Step,
        condition: &str,
        then_steps: &[Step],
        else_ifs: &[ElseIfBranch],
        else_steps: &[Step],
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();
        let snapshot = ctx.snapshot();

        let top = match self.evaluator().eval_bool(condition, &snapshot) {
            Ok(value) => value,
            Err(e) => {
                return Ok(StepResult::failed(
                    &step.id,
                    started.elapsed().as_millis() as u64,
                    format!("condition evaluation failed: {e}"),
                ));
            }
        };

        // (branch name, index within its kind, steps to run)
        let mut chosen: Option<(&str, usize, &[Step])> = None;
        if top {
            chosen = Some(("then", 0, then_steps));
        } else {
            for (index, arm) in else_ifs.iter().enumerate() {
                match self.evaluator().eval_bool(&arm.condition, &snapshot) {
                    Ok(true) => {
                        chosen = Some(("else_if", index, arm.steps.as_slice()));
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        return Ok(StepResult::failed(
                            &step.id,
                            started.elapsed().as_millis() as u64,
                            format!("else_if[{index}] condition evaluation failed: {e}"),
                        ));
                    }
                }
            }
            if chosen.is_none() && !else_steps.is_empty() {
                chosen = Some(("else", 0, else_steps));
            }
        }

        let Some((branch, branch_index, steps)) = chosen else {
            return Ok(StepResult::success(
                &step.id,
                started.elapsed().as_millis() as u64,
                json!({ "branch": "none", "condition": false }),
            ));
        };

        tracing::debug!(
            step_id = step.id.as_str(),
            branch,
            branch_index,
            "taking branch"
        );

        match self.run_sequence(steps, ctx, cancel).await? {
            SeqOutcome::Completed => Ok(StepResult::success(
                &step.id,
                started.elapsed().as_millis() as u64,
                json!({
                    "branch": branch,
                    "branch_index": branch_index,
                    "condition": top,
                }),
            )),
            SeqOutcome::Failed { step_id, error } => Ok(StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                duration_ms: started.elapsed().as_millis() as u64,
                output: json!({ "branch": branch, "branch_index": branch_index }),
                error: Some(format!("step '{step_id}' failed: {error}")),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
