//! Environment bindings: the provider seam, the config merger, environment
//! copying, and variable export/import.
//!
//! The execution core consumes environments through two narrow interfaces:
//! [`BindingsProvider`] yields an environment and its bindings, and
//! [`ConfigMerger`] folds bindings into a workflow definition at submission
//! time. Binding lifecycles (CRUD) are owned by the surrounding platform.

use std::collections::HashMap;

use testflow_types::environment::{
    Environment, EnvironmentBindings, MergedEnvironment, VariableBinding,
};
use testflow_types::error::RepositoryError;
use testflow_types::workflow::FlowDefinition;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from merging bindings into a definition, or from variable
/// export/import.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("duplicate domain binding '{0}'")]
    DuplicateDomain(String),

    #[error("duplicate variable key '{0}'")]
    DuplicateVariable(String),

    #[error("variable serialization failed: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// BindingsProvider trait
// ---------------------------------------------------------------------------

/// Source of environments and their bindings.
pub trait BindingsProvider: Send + Sync {
    /// Load an environment by ID.
    fn environment(
        &self,
        env_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Environment>, RepositoryError>> + Send;

    /// Load the bindings for an environment.
    fn bindings(
        &self,
        env_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<EnvironmentBindings, RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// ConfigMerger trait
// ---------------------------------------------------------------------------

/// Folds environment bindings into a parsed workflow definition.
///
/// The supervisor's contract: merge errors abort submission.
pub trait ConfigMerger: Send + Sync {
    fn merge(
        &self,
        definition: FlowDefinition,
        env: &Environment,
        bindings: &EnvironmentBindings,
    ) -> Result<FlowDefinition, MergeError>;
}

/// Default merger: fills the definition's `env` slot (domains keyed by name,
/// DB/MQ configs verbatim) and seeds variables from bindings.
///
/// Environment variables override same-named initial variables authored in
/// the workflow; the environment is the per-deployment source of truth.
/// Sensitive values pass through untouched (decryption is a collaborator
/// concern).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentMerger;

impl ConfigMerger for EnvironmentMerger {
    fn merge(
        &self,
        mut definition: FlowDefinition,
        env: &Environment,
        bindings: &EnvironmentBindings,
    ) -> Result<FlowDefinition, MergeError> {
        let mut domains = HashMap::with_capacity(bindings.domains.len());
        for domain in &bindings.domains {
            if domains.insert(domain.name.clone(), domain.clone()).is_some() {
                return Err(MergeError::DuplicateDomain(domain.name.clone()));
            }
        }

        let mut seen_keys = std::collections::HashSet::new();
        for variable in &bindings.variables {
            if !seen_keys.insert(variable.key.as_str()) {
                return Err(MergeError::DuplicateVariable(variable.key.clone()));
            }
            definition
                .variables
                .insert(variable.key.clone(), variable.value.clone());
        }

        definition.env = Some(MergedEnvironment {
            env_id: env.id,
            domains,
            db_configs: bindings.db_configs.clone(),
            mq_configs: bindings.mq_configs.clone(),
        });

        tracing::debug!(
            env_id = %env.id,
            domains = bindings.domains.len(),
            variables = bindings.variables.len(),
            "merged environment into definition"
        );
        Ok(definition)
    }
}

// ---------------------------------------------------------------------------
// Environment copy
// ---------------------------------------------------------------------------

/// Copy an environment: a new environment (fresh ID, given name) with
/// equal-count, field-equal bindings in every category.
pub fn copy_environment(
    env: &Environment,
    bindings: &EnvironmentBindings,
    new_name: &str,
) -> (Environment, EnvironmentBindings) {
    let copy = Environment {
        id: Uuid::now_v7(),
        project_id: env.project_id,
        name: new_name.to_string(),
        created_at: chrono::Utc::now(),
    };
    (copy, bindings.clone())
}

// ---------------------------------------------------------------------------
// Variable export / import
// ---------------------------------------------------------------------------

/// Export variable bindings as a JSON document, preserving order.
pub fn export_variables(variables: &[VariableBinding]) -> Result<String, MergeError> {
    serde_json::to_string_pretty(variables).map_err(|e| MergeError::Serialization(e.to_string()))
}

/// Import variable bindings from a JSON document produced by
/// [`export_variables`].
pub fn import_variables(content: &str) -> Result<Vec<VariableBinding>, MergeError> {
    serde_json::from_str(content).map_err(|e| MergeError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
