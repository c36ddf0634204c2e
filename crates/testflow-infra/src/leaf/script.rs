//! Script leaf executor.
//!
//! Resolves `${var}` placeholders into the source and returns the resolved
//! script descriptor. Actual script execution is delegated to the runtime on
//! the worker host; this executor prepares the payload it consumes.

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use testflow_core::flow::{ExecutionContext, LeafError, LeafExecutor};
use testflow_types::workflow::{Step, StepConfig};
use tokio_util::sync::CancellationToken;

use super::resolve_placeholders;

/// Executor for `script` leaf steps.
#[derive(Default)]
pub struct ScriptLeafExecutor;

impl ScriptLeafExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl LeafExecutor for ScriptLeafExecutor {
    fn execute<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, LeafError>> {
        Box::pin(async move {
            let StepConfig::Script { language, source } = &step.config else {
                return Err(LeafError::Failed("not a script step".to_string()));
            };

            let resolved = resolve_placeholders(source, ctx);
            tracing::debug!(
                step_id = step.id.as_str(),
                language = language.as_str(),
                source_len = resolved.len(),
                "script step prepared"
            );

            Ok(json!({
                "language": language,
                "source": resolved,
                "status": "delegated",
                "note": "script execution delegated to the worker runtime",
            }))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
