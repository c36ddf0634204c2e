//! Workflow domain types for Testflow.
//!
//! Defines the canonical intermediate representation for workflows: both
//! surface encodings (compact JSON and human-readable YAML) convert to and
//! from [`Workflow`] / [`FlowDefinition`]. A workflow's body is a tree of
//! [`Step`]s: leaf steps (`http`, `script`, `break`, `continue`) and flow
//! operators (`if`, `while`, `for`, `foreach`, `parallel`, `retry`, `sleep`,
//! `wait_until`) whose configs own their sub-step arrays outright.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::environment::MergedEnvironment;
use crate::execution::ExecutionMode;
use crate::executor::DispatchStrategy;

// ---------------------------------------------------------------------------
// Workflow record
// ---------------------------------------------------------------------------

/// A stored workflow: the definition plus project metadata.
///
/// `version` is monotonic: every content mutation increments it by exactly 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Monotonic content version (>= 1).
    pub version: u32,
    /// The step tree plus initial variables and the environment slot.
    pub definition: FlowDefinition,
    /// What kind of workflow this is (constrains the execution mode).
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    /// How executions of this workflow are dispatched to workers.
    #[serde(default)]
    pub executor_config: DispatchStrategy,
    /// Whether the workflow may be executed at all.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// When the workflow was first saved.
    pub created_at: DateTime<Utc>,
    /// When the workflow was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Whether `self` and `other` differ in content (name or definition).
    ///
    /// Content changes bump `version`; metadata-only changes do not.
    pub fn content_differs(&self, other: &Workflow) -> bool {
        self.name != other.name || self.definition != other.definition
    }
}

/// The kind of workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Authoring/debugging workflows; may only run in debug mode.
    Normal,
    /// Load-test workflows.
    Performance,
    /// Test-data generation workflows.
    DataGeneration,
}

impl WorkflowType {
    /// Whether this workflow type may run in the given execution mode.
    ///
    /// `normal` workflows support debug mode only; the other types may run
    /// in either mode.
    pub fn allows_mode(&self, mode: ExecutionMode) -> bool {
        match self {
            WorkflowType::Normal => mode == ExecutionMode::Debug,
            WorkflowType::Performance | WorkflowType::DataGeneration => true,
        }
    }

    /// Stable string form used in config keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Normal => "normal",
            WorkflowType::Performance => "performance",
            WorkflowType::DataGeneration => "data_generation",
        }
    }
}

/// Whether a workflow is available for execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Enabled,
    Disabled,
}

// ---------------------------------------------------------------------------
// Flow definition
// ---------------------------------------------------------------------------

/// The executable body of a workflow.
///
/// `env` is the runtime-replacement slot: it is empty in the stored
/// definition and filled by the config merger at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Initial variable bindings seeded into the execution context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, Value>,
    /// The ordered top-level step sequence.
    pub steps: Vec<Step>,
    /// Merged per-environment configuration (filled at submission time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<MergedEnvironment>,
}

// ---------------------------------------------------------------------------
// Step tree
// ---------------------------------------------------------------------------

/// A single node in the workflow step tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// User-defined step ID. Unique within a workflow.
    pub id: String,
    /// Human-readable step name.
    #[serde(default)]
    pub name: String,
    /// The kind of step.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Step-specific configuration payload.
    pub config: StepConfig,
}

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Http,
    Script,
    Break,
    Continue,
    If,
    While,
    For,
    Foreach,
    Parallel,
    Retry,
    Sleep,
    WaitUntil,
}

impl StepType {
    /// Whether this step is a flow operator (owns sub-steps) rather than a leaf.
    pub fn is_flow(&self) -> bool {
        matches!(
            self,
            StepType::If
                | StepType::While
                | StepType::For
                | StepType::Foreach
                | StepType::Parallel
                | StepType::Retry
                | StepType::Sleep
                | StepType::WaitUntil
        )
    }

    /// Stable string form used in registry keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Http => "http",
            StepType::Script => "script",
            StepType::Break => "break",
            StepType::Continue => "continue",
            StepType::If => "if",
            StepType::While => "while",
            StepType::For => "for",
            StepType::Foreach => "foreach",
            StepType::Parallel => "parallel",
            StepType::Retry => "retry",
            StepType::Sleep => "sleep",
            StepType::WaitUntil => "wait_until",
        }
    }
}

/// An `else_if` arm of an [`StepConfig::If`] operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseIfBranch {
    /// Condition expression for this arm.
    pub condition: String,
    /// Steps executed when the condition holds.
    pub steps: Vec<Step>,
}

/// Back-off shape for the `retry` operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Every inter-attempt delay equals `delay`.
    #[default]
    Fixed,
    /// Delay grows as `delay * attempt`.
    Linear,
    /// Delay grows as `delay * 2^(attempt-1)`.
    Exponential,
}

/// Step-specific configuration payload.
///
/// Internally tagged by `type` to match the surface encodings:
/// ```yaml
/// config:
///   type: while
///   condition: "variables.i < 3"
///   steps: [...]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Make an HTTP request.
    Http {
        method: String,
        /// Request path, resolved against a bound domain when `domain` is set.
        url: String,
        /// Name of a domain binding from the merged environment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Run a script in an external runtime.
    Script {
        language: String,
        source: String,
    },
    /// Emit a break signal for the nearest (or labeled) enclosing loop.
    Break {
        #[serde(default)]
        label: String,
    },
    /// Emit a continue signal for the nearest (or labeled) enclosing loop.
    Continue {
        #[serde(default)]
        label: String,
    },
    /// Conditional branching with `else_if` arms.
    If {
        condition: String,
        then_steps: Vec<Step>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        else_ifs: Vec<ElseIfBranch>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        else_steps: Vec<Step>,
    },
    /// Loop while a condition holds.
    While {
        condition: String,
        steps: Vec<Step>,
        #[serde(default)]
        label: String,
        #[serde(default = "default_max_iterations")]
        max_iterations: u64,
    },
    /// Counted loop over an inclusive numeric range.
    For {
        start: i64,
        end: i64,
        #[serde(default = "default_for_step")]
        step: i64,
        index_var: String,
        steps: Vec<Step>,
        #[serde(default)]
        label: String,
    },
    /// Iterate a sequence-valued variable reference (`${name}`).
    Foreach {
        items: String,
        item_var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index_var: Option<String>,
        steps: Vec<Step>,
        #[serde(default)]
        label: String,
    },
    /// Run sub-steps concurrently with a bounded degree of parallelism.
    Parallel {
        steps: Vec<Step>,
        #[serde(default = "default_max_concurrent")]
        max_concurrent: usize,
        #[serde(default)]
        fail_fast: bool,
    },
    /// Re-run sub-steps with back-off until they succeed or attempts run out.
    Retry {
        steps: Vec<Step>,
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_retry_delay_ms")]
        delay_ms: u64,
        #[serde(default)]
        backoff: Backoff,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_delay_ms: Option<u64>,
    },
    /// Pause for a fixed duration.
    Sleep {
        duration_ms: u64,
    },
    /// Poll a condition until it holds or a deadline passes.
    WaitUntil {
        condition: String,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_wait_interval_ms")]
        interval_ms: u64,
    },
}

fn default_max_iterations() -> u64 {
    1000
}

fn default_for_step() -> i64 {
    1
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_wait_timeout_ms() -> u64 {
    30_000
}

fn default_wait_interval_ms() -> u64 {
    1000
}

impl StepConfig {
    /// The step type this config belongs to.
    pub fn kind(&self) -> StepType {
        match self {
            StepConfig::Http { .. } => StepType::Http,
            StepConfig::Script { .. } => StepType::Script,
            StepConfig::Break { .. } => StepType::Break,
            StepConfig::Continue { .. } => StepType::Continue,
            StepConfig::If { .. } => StepType::If,
            StepConfig::While { .. } => StepType::While,
            StepConfig::For { .. } => StepType::For,
            StepConfig::Foreach { .. } => StepType::Foreach,
            StepConfig::Parallel { .. } => StepType::Parallel,
            StepConfig::Retry { .. } => StepType::Retry,
            StepConfig::Sleep { .. } => StepType::Sleep,
            StepConfig::WaitUntil { .. } => StepType::WaitUntil,
        }
    }

    /// All sub-step sequences owned by this config, in declaration order.
    ///
    /// Leaves return an empty vector. Used by validation and tree walks.
    pub fn child_sequences(&self) -> Vec<&[Step]> {
        match self {
            StepConfig::If {
                then_steps,
                else_ifs,
                else_steps,
                ..
            } => {
                let mut seqs: Vec<&[Step]> = vec![then_steps.as_slice()];
                seqs.extend(else_ifs.iter().map(|b| b.steps.as_slice()));
                seqs.push(else_steps.as_slice());
                seqs
            }
            StepConfig::While { steps, .. }
            | StepConfig::For { steps, .. }
            | StepConfig::Foreach { steps, .. }
            | StepConfig::Parallel { steps, .. }
            | StepConfig::Retry { steps, .. } => vec![steps.as_slice()],
            _ => Vec::new(),
        }
    }
}

impl Step {
    /// Visit this step and every descendant, depth-first, in declaration order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Step)) {
        f(self);
        for seq in self.config.child_sequences() {
            for child in seq {
                child.visit(f);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
