//! Environment binding types: domains, variables, database and message-queue
//! configurations, and the merged form injected into workflow definitions.
//!
//! Binding lifecycles are owned by the surrounding platform; this crate only
//! models the shapes the execution core consumes at submission time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// An environment a workflow can be executed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: Uuid,
    /// Owning project; must match the workflow's project at submission.
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// A named base URL plus default headers for HTTP steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainBinding {
    pub name: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Declared type of a variable binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Json,
}

/// One environment variable binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableBinding {
    pub name: String,
    pub key: String,
    pub value: Value,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    #[serde(default)]
    pub is_sensitive: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Connection settings for a database a workflow may touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    pub name: String,
    pub driver: String,
    pub dsn: String,
    #[serde(default)]
    pub max_connections: u32,
}

/// Connection settings for a message queue a workflow may touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqConfig {
    pub name: String,
    pub kind: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Everything bound to one environment, fetched at submission time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentBindings {
    #[serde(default)]
    pub domains: Vec<DomainBinding>,
    #[serde(default)]
    pub variables: Vec<VariableBinding>,
    #[serde(default)]
    pub db_configs: Vec<DbConfig>,
    #[serde(default)]
    pub mq_configs: Vec<MqConfig>,
}

// ---------------------------------------------------------------------------
// Merged form
// ---------------------------------------------------------------------------

/// Environment configuration after merging into a workflow definition.
///
/// This is the runtime-replacement slot the config merger fills: domains
/// keyed by name for HTTP steps, plus the database/queue configs the engine
/// hands to leaf executors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedEnvironment {
    /// Source environment.
    pub env_id: Uuid,
    /// Domain bindings keyed by name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub domains: HashMap<String, DomainBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub db_configs: Vec<DbConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mq_configs: Vec<MqConfig>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
