//! Leaf executor seam: the interpreter dispatches leaf steps (`http`,
//! `script`, ...) to executors supplied by an external registry and never
//! interprets leaf semantics itself.
//!
//! The trait is object-safe via `BoxFuture` so registries can hold
//! heterogeneous executors behind `Arc<dyn LeafExecutor>`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use testflow_types::workflow::{Step, StepType};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure modes of a leaf execution.
#[derive(Debug, thiserror::Error)]
pub enum LeafError {
    /// The leaf ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The leaf exceeded its own deadline.
    #[error("step timed out")]
    Timeout,

    /// The leaf observed cancellation and stopped early.
    #[error("cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// LeafExecutor trait
// ---------------------------------------------------------------------------

/// Executes one kind of leaf step.
///
/// Implementations read the step's config, may read and write context
/// variables (script steps assign variables this way), honor the
/// cancellation token best-effort, and return the step's output payload.
/// Duration accounting and result recording are owned by the interpreter.
pub trait LeafExecutor: Send + Sync {
    /// Execute the leaf step and return its output value.
    fn execute<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, LeafError>>;
}

// ---------------------------------------------------------------------------
// LeafRegistry
// ---------------------------------------------------------------------------

/// Maps leaf step types to their executors.
#[derive(Default)]
pub struct LeafRegistry {
    executors: HashMap<StepType, Arc<dyn LeafExecutor>>,
}

impl LeafRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for a leaf step type, replacing any previous one.
    pub fn register(&mut self, step_type: StepType, executor: Arc<dyn LeafExecutor>) {
        self.executors.insert(step_type, executor);
    }

    /// Look up the executor for a step type.
    pub fn get(&self, step_type: StepType) -> Option<&Arc<dyn LeafExecutor>> {
        self.executors.get(&step_type)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
