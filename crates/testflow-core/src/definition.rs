//! Workflow definition parsing, validation, and surface encodings.
//!
//! Two interchangeable encodings of [`FlowDefinition`] are supported: compact
//! JSON and human-readable YAML. Translation between them is lossless for all
//! supported step types. Parsing always runs structural validation, so a
//! returned definition is guaranteed well-formed.

use std::collections::HashSet;

use testflow_types::workflow::{FlowDefinition, Step, StepConfig};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing or validating a workflow definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// JSON/YAML parse failure (including unknown step types).
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse the compact JSON encoding into a validated [`FlowDefinition`].
pub fn parse_definition_json(json: &str) -> Result<FlowDefinition, DefinitionError> {
    let def: FlowDefinition =
        serde_json::from_str(json).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Parse the human-readable YAML encoding into a validated [`FlowDefinition`].
pub fn parse_definition_yaml(yaml: &str) -> Result<FlowDefinition, DefinitionError> {
    let def: FlowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a definition to the compact JSON encoding.
pub fn serialize_definition_json(def: &FlowDefinition) -> Result<String, DefinitionError> {
    serde_json::to_string(def).map_err(|e| DefinitionError::Parse(e.to_string()))
}

/// Serialize a definition to the human-readable YAML encoding.
pub fn serialize_definition_yaml(def: &FlowDefinition) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(def).map_err(|e| DefinitionError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a [`FlowDefinition`].
///
/// Checks:
/// - At least one step exists
/// - Step IDs are non-empty and unique across the whole tree
/// - Each step's declared `type` agrees with its config variant
/// - Loop/concurrency/retry bounds are at least 1
/// - `wait_until` polls with a non-zero interval
/// - `for` and `foreach` bind non-empty variable names
pub fn validate_definition(def: &FlowDefinition) -> Result<(), DefinitionError> {
    if def.steps.is_empty() {
        return Err(DefinitionError::Validation(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut error: Option<DefinitionError> = None;

    for step in &def.steps {
        step.visit(&mut |s| {
            if error.is_some() {
                return;
            }
            error = check_step(s, &mut seen_ids).err();
        });
        if let Some(e) = error.take() {
            return Err(e);
        }
    }

    Ok(())
}

fn check_step<'a>(
    step: &'a Step,
    seen_ids: &mut HashSet<&'a str>,
) -> Result<(), DefinitionError> {
    if step.id.is_empty() {
        return Err(DefinitionError::Validation(
            "step ID must not be empty".to_string(),
        ));
    }
    if !seen_ids.insert(step.id.as_str()) {
        return Err(DefinitionError::Validation(format!(
            "duplicate step ID: '{}'",
            step.id
        )));
    }
    if step.step_type != step.config.kind() {
        return Err(DefinitionError::Validation(format!(
            "step '{}' declares type '{}' but its config is '{}'",
            step.id,
            step.step_type.as_str(),
            step.config.kind().as_str()
        )));
    }

    match &step.config {
        StepConfig::While { max_iterations, .. } => {
            if *max_iterations == 0 {
                return Err(DefinitionError::Validation(format!(
                    "step '{}': max_iterations must be >= 1",
                    step.id
                )));
            }
        }
        StepConfig::For { index_var, .. } => {
            if index_var.is_empty() {
                return Err(DefinitionError::Validation(format!(
                    "step '{}': index_var must not be empty",
                    step.id
                )));
            }
        }
        StepConfig::Foreach { item_var, .. } => {
            if item_var.is_empty() {
                return Err(DefinitionError::Validation(format!(
                    "step '{}': item_var must not be empty",
                    step.id
                )));
            }
        }
        StepConfig::Parallel { max_concurrent, .. } => {
            if *max_concurrent == 0 {
                return Err(DefinitionError::Validation(format!(
                    "step '{}': max_concurrent must be >= 1",
                    step.id
                )));
            }
        }
        StepConfig::Retry { max_attempts, .. } => {
            if *max_attempts == 0 {
                return Err(DefinitionError::Validation(format!(
                    "step '{}': max_attempts must be >= 1",
                    step.id
                )));
            }
        }
        StepConfig::WaitUntil { interval_ms, .. } => {
            if *interval_ms == 0 {
                return Err(DefinitionError::Validation(format!(
                    "step '{}': interval_ms must be >= 1",
                    step.id
                )));
            }
        }
        StepConfig::Http { method, .. } => {
            if method.is_empty() {
                return Err(DefinitionError::Validation(format!(
                    "step '{}': HTTP method must not be empty",
                    step.id
                )));
            }
        }
        _ => {}
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
