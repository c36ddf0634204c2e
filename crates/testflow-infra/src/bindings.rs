//! Static in-memory bindings provider for tests and embedded deployments.

use dashmap::DashMap;
use testflow_core::environment::BindingsProvider;
use testflow_types::environment::{Environment, EnvironmentBindings};
use testflow_types::error::RepositoryError;
use uuid::Uuid;

/// Bindings provider over an in-memory environment table.
#[derive(Default)]
pub struct StaticBindingsProvider {
    environments: DashMap<Uuid, (Environment, EnvironmentBindings)>,
}

impl StaticBindingsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an environment with its bindings.
    pub fn insert(&self, env: Environment, bindings: EnvironmentBindings) {
        self.environments.insert(env.id, (env, bindings));
    }
}

impl BindingsProvider for StaticBindingsProvider {
    async fn environment(&self, env_id: &Uuid) -> Result<Option<Environment>, RepositoryError> {
        Ok(self.environments.get(env_id).map(|entry| entry.0.clone()))
    }

    async fn bindings(&self, env_id: &Uuid) -> Result<EnvironmentBindings, RepositoryError> {
        Ok(self
            .environments
            .get(env_id)
            .map(|entry| entry.1.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
