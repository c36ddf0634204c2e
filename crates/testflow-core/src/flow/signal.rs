//! Control-flow signals: `break` and `continue` modeled as tagged non-value
//! interrupts, kept apart from ordinary step failures so a loop can never
//! mistake a real error for control flow.
//!
//! A signal bubbles up through the operator stack until a loop whose label
//! matches (or any loop, for an empty label) consumes it. Cancellation rides
//! the same channel because it also abandons the current block, but nothing
//! consumes it below the run root.

// ---------------------------------------------------------------------------
// FlowSignal
// ---------------------------------------------------------------------------

/// A loop-control signal emitted by a `break` or `continue` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowSignal {
    /// Exit the matching loop normally.
    Break { label: String },
    /// Advance the matching loop to its next iteration.
    Continue { label: String },
}

impl FlowSignal {
    /// The label carried by the signal (may be empty = nearest loop).
    pub fn label(&self) -> &str {
        match self {
            FlowSignal::Break { label } | FlowSignal::Continue { label } => label,
        }
    }

    /// Whether a loop with `loop_label` consumes this signal.
    ///
    /// An empty signal label matches any loop; otherwise the labels must be
    /// equal.
    pub fn matches(&self, loop_label: &str) -> bool {
        let label = self.label();
        label.is_empty() || label == loop_label
    }
}

// ---------------------------------------------------------------------------
// Interrupt
// ---------------------------------------------------------------------------

/// Why a block stopped before producing a value.
///
/// Internal to the interpreter: operators return
/// `Result<StepResult, Interrupt>` and either consume interrupts (loops eat
/// matching signals) or pass them upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Interrupt {
    /// A break/continue travelling toward its loop.
    Signal(FlowSignal),
    /// The run's cancellation token fired.
    Cancelled,
}

// ---------------------------------------------------------------------------
// SeqOutcome
// ---------------------------------------------------------------------------

/// Outcome of running one sequential block of sibling steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SeqOutcome {
    /// Every step ran and none failed.
    Completed,
    /// A step failed or timed out; the rest of the block was abandoned.
    Failed { step_id: String, error: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
