//! The `retry` operator: bounded re-execution with shaped back-off.
//!
//! An attempt succeeds iff every sub-step succeeds. Failed attempts sleep
//! `delay(attempt)` before the next try; attempt 1 incurs no pre-delay. The
//! back-off sleep is cancellable, and cancellation is reported as its own
//! terminal reason with the attempt/delay accounting intact.

use std::time::{Duration, Instant};

use serde_json::json;
use testflow_types::execution::{StepResult, StepStatus};
use testflow_types::workflow::{Backoff, Step};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::interpreter::FlowInterpreter;
use super::signal::{Interrupt, SeqOutcome};

/// Inter-attempt delay in milliseconds after the given failed attempt
/// (1-based), clamped to `max_delay_ms` when set.
pub(crate) fn backoff_delay_ms(
    backoff: Backoff,
    base_ms: u64,
    attempt: u32,
    max_delay_ms: Option<u64>,
) -> u64 {
    let raw = match backoff {
        Backoff::Fixed => base_ms,
        Backoff::Linear => base_ms.saturating_mul(attempt as u64),
        Backoff::Exponential => {
            let shift = attempt.saturating_sub(1).min(63);
            base_ms.saturating_mul(1u64 << shift)
        }
    };
    match max_delay_ms {
        Some(clamp) => raw.min(clamp),
        None => raw,
    }
}

impl FlowInterpreter {
    /// `retry(steps, max_attempts, delay, backoff, max_delay?)`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn exec_retry(
        &self,
        step: &Step,
        steps: &[Step],
        max_attempts: u32,
        delay_ms: u64,
        backoff: Backoff,
        max_delay_ms: Option<u64>,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, Interrupt> {
        let started = Instant::now();
        let max_attempts = max_attempts.max(1);

        let mut attempts: u32 = 0;
        let mut delays: Vec<u64> = Vec::new();
        let mut last_error: Option<String> = None;
        let mut terminated_by = "max_attempts";

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                terminated_by = "context_cancelled";
                break;
            }

            attempts = attempt;
            match self.run_sequence(steps, ctx, cancel).await {
                Ok(SeqOutcome::Completed) => {
                    terminated_by = "success";
                    break;
                }
                Ok(SeqOutcome::Failed { step_id, error }) => {
                    tracing::debug!(
                        step_id = step.id.as_str(),
                        attempt,
                        failed_step = step_id.as_str(),
                        "retry attempt failed"
                    );
                    last_error = Some(format!("step '{step_id}' failed: {error}"));
                }
                Err(Interrupt::Cancelled) => {
                    terminated_by = "context_cancelled";
                    break;
                }
                // Break/continue target a loop outside the retry block.
                Err(signal) => return Err(signal),
            }

            if attempt < max_attempts {
                let delay = backoff_delay_ms(backoff, delay_ms, attempt, max_delay_ms);
                delays.push(delay);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    _ = cancel.cancelled() => {
                        terminated_by = "context_cancelled";
                        break;
                    }
                }
            }
        }

        let output = json!({
            "attempts": attempts,
            "delays_ms": delays,
            "terminated_by": terminated_by,
            "last_error": last_error.clone(),
        });
        let duration_ms = started.elapsed().as_millis() as u64;

        if terminated_by == "success" {
            Ok(StepResult::success(&step.id, duration_ms, output))
        } else {
            let error = match terminated_by {
                "context_cancelled" => "retry cancelled".to_string(),
                _ => last_error.unwrap_or_else(|| "all attempts failed".to_string()),
            };
            Ok(StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                duration_ms,
                output,
                error: Some(error),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::expression::JexlEvaluator;
    use crate::flow::leaf::LeafRegistry;
    use crate::flow::testing::{FailNTimesLeaf, ScriptedLeaf, interpreter_with, script_step};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use testflow_types::workflow::{StepConfig, StepType};

    fn retry_step(
        body: Vec<Step>,
        max_attempts: u32,
        delay_ms: u64,
        backoff: Backoff,
        max_delay_ms: Option<u64>,
    ) -> Step {
        Step {
            id: "retry".to_string(),
            name: String::new(),
            step_type: StepType::Retry,
            config: StepConfig::Retry {
                steps: body,
                max_attempts,
                delay_ms,
                backoff,
                max_delay_ms,
            },
        }
    }

    // -------------------------------------------------------------------
    // Back-off schedule
    // -------------------------------------------------------------------

    #[test]
    fn test_fixed_backoff() {
        for attempt in 1..=5 {
            assert_eq!(backoff_delay_ms(Backoff::Fixed, 100, attempt, None), 100);
        }
    }

    #[test]
    fn test_linear_backoff_monotonic() {
        let delays: Vec<u64> = (1..=5)
            .map(|a| backoff_delay_ms(Backoff::Linear, 100, a, None))
            .collect();
        assert_eq!(delays, vec![100, 200, 300, 400, 500]);
        for window in delays.windows(2) {
            assert!(window[1] >= window[0]);
        }
    }

    #[test]
    fn test_exponential_backoff_monotonic() {
        let delays: Vec<u64> = (1..=5)
            .map(|a| backoff_delay_ms(Backoff::Exponential, 100, a, None))
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600]);
        for window in delays.windows(2) {
            assert!(window[1] >= window[0]);
        }
    }

    #[test]
    fn test_max_delay_clamp() {
        assert_eq!(
            backoff_delay_ms(Backoff::Exponential, 100, 4, Some(250)),
            250
        );
        assert_eq!(backoff_delay_ms(Backoff::Linear, 100, 5, Some(350)), 350);
        assert_eq!(backoff_delay_ms(Backoff::Fixed, 100, 5, Some(50)), 50);
    }

    #[test]
    fn test_exponential_backoff_does_not_overflow() {
        let delay = backoff_delay_ms(Backoff::Exponential, u64::MAX / 2, 80, None);
        assert_eq!(delay, u64::MAX);
    }

    // -------------------------------------------------------------------
    // Attempt accounting
    // -------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_body_runs_exactly_n_attempts() {
        let leaf = Arc::new(FailNTimesLeaf::new(u32::MAX));
        let mut registry = LeafRegistry::new();
        registry.register(StepType::Script, leaf.clone());
        let interp = FlowInterpreter::new(registry, JexlEvaluator::new());

        let step = retry_step(vec![script_step("flaky")], 3, 100, Backoff::Fixed, None);
        let mut ctx = ExecutionContext::new();
        let err = interp
            .run(&[step], &mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("flaky"));
        assert_eq!(leaf.calls(), 3);

        let result = ctx.results.get("retry").unwrap();
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.output["attempts"], json!(3));
        assert_eq!(result.output["terminated_by"], json!("max_attempts"));
        // Exactly N-1 inter-attempt delays.
        assert_eq!(result.output["delays_ms"], json!([100, 100]));
        assert!(
            result.output["last_error"]
                .as_str()
                .unwrap()
                .contains("transient failure")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_delays_with_clamp() {
        // Spec scenario: 3 attempts, delay=100ms, exponential, max_delay=250ms
        // -> slept delays [100, 200].
        let leaf = Arc::new(FailNTimesLeaf::new(u32::MAX));
        let mut registry = LeafRegistry::new();
        registry.register(StepType::Script, leaf.clone());
        let interp = FlowInterpreter::new(registry, JexlEvaluator::new());

        let step = retry_step(
            vec![script_step("flaky")],
            3,
            100,
            Backoff::Exponential,
            Some(250),
        );
        let mut ctx = ExecutionContext::new();
        let _ = interp
            .run(&[step], &mut ctx, &CancellationToken::new())
            .await;

        let result = ctx.results.get("retry").unwrap();
        assert_eq!(result.output["delays_ms"], json!([100, 200]));
        assert_eq!(result.output["attempts"], json!(3));
        assert_eq!(result.output["terminated_by"], json!("max_attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let leaf = Arc::new(FailNTimesLeaf::new(2));
        let mut registry = LeafRegistry::new();
        registry.register(StepType::Script, leaf.clone());
        let interp = FlowInterpreter::new(registry, JexlEvaluator::new());

        let step = retry_step(vec![script_step("flaky")], 5, 50, Backoff::Fixed, None);
        let mut ctx = ExecutionContext::new();
        interp
            .run(&[step], &mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(leaf.calls(), 3);
        let result = ctx.results.get("retry").unwrap();
        assert_eq!(result.status, StepStatus::Success);
        assert_eq!(result.output["attempts"], json!(3));
        assert_eq!(result.output["terminated_by"], json!("success"));
        assert_eq!(result.output["delays_ms"], json!([50, 50]));
    }

    #[tokio::test]
    async fn test_first_attempt_success_sleeps_nothing() {
        let leaf = Arc::new(ScriptedLeaf::default());
        let interp = interpreter_with(leaf);

        let step = retry_step(
            vec![script_step("steady")],
            3,
            60_000,
            Backoff::Fixed,
            None,
        );
        let started = Instant::now();
        let mut ctx = ExecutionContext::new();
        interp
            .run(&[step], &mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        // A pre-delay on attempt 1 would make this take a minute.
        assert!(started.elapsed() < Duration::from_secs(5));
        let result = ctx.results.get("retry").unwrap();
        assert_eq!(result.output["attempts"], json!(1));
        assert_eq!(result.output["delays_ms"], json!([]));
    }

    // -------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let leaf = Arc::new(FailNTimesLeaf::new(u32::MAX));
        let mut registry = LeafRegistry::new();
        registry.register(StepType::Script, leaf.clone());
        let interp = FlowInterpreter::new(registry, JexlEvaluator::new());

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let step = retry_step(
            vec![script_step("flaky")],
            10,
            60_000,
            Backoff::Fixed,
            None,
        );
        let started = Instant::now();
        let mut ctx = ExecutionContext::new();
        let _ = interp.run(&[step], &mut ctx, &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        let result = ctx.results.get("retry").unwrap();
        assert_eq!(result.output["terminated_by"], json!("context_cancelled"));
        assert_eq!(leaf.calls(), 1);
    }
}
