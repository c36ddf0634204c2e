//! Execution context: the mutable state that flows through one workflow run.
//!
//! The context is two maps: named variables and per-step results. Each
//! `parallel` branch receives a shallow copy of both maps via [`ExecutionContext::fork`],
//! so concurrent branches never share mutable state; value aliasing inside
//! `serde_json::Value` trees is acceptable because branches only ever replace
//! whole entries.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use testflow_types::environment::MergedEnvironment;
use testflow_types::execution::StepResult;

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable state for one workflow run (or one parallel branch of it).
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Named variables, readable from expressions as `variables.<name>`.
    pub variables: HashMap<String, Value>,
    /// Step results keyed by step ID, readable as `results.<id>`.
    pub results: HashMap<String, StepResult>,
    /// The merged environment (domains, DB/MQ configs); read-only ambient
    /// data shared by all branches.
    environment: Option<Arc<MergedEnvironment>>,
}

impl ExecutionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context seeded with initial variable bindings.
    pub fn seeded(variables: &HashMap<String, Value>) -> Self {
        Self {
            variables: variables.clone(),
            results: HashMap::new(),
            environment: None,
        }
    }

    /// Attach a merged environment for leaf executors to consult.
    pub fn with_environment(mut self, environment: Option<MergedEnvironment>) -> Self {
        self.environment = environment.map(Arc::new);
        self
    }

    /// The merged environment, if the definition carried one.
    pub fn environment(&self) -> Option<&MergedEnvironment> {
        self.environment.as_deref()
    }

    /// Shallow-copy this context for an isolated parallel branch.
    ///
    /// The maps are copied; writes in the branch never reach the parent.
    /// The parent merges branch results back explicitly after the branch
    /// completes.
    pub fn fork(&self) -> Self {
        Self {
            variables: self.variables.clone(),
            results: self.results.clone(),
            environment: self.environment.clone(),
        }
    }

    /// Record a step result, replacing any previous result for the same step.
    pub fn record(&mut self, result: StepResult) {
        self.results.insert(result.step_id.clone(), result);
    }

    /// Set a variable.
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Read a variable.
    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Build the JSON snapshot expressions evaluate against.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "variables": { "<name>": <value>, ... },
    ///   "results": { "<step_id>": { "status": "...", "output": ..., ... }, ... }
    /// }
    /// ```
    pub fn snapshot(&self) -> Value {
        json!({
            "variables": self.variables,
            "results": self.results,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
