//! Shared domain types for Testflow.
//!
//! This crate contains the core domain types used across the Testflow
//! platform: workflows and their step trees, executions, executor fleet
//! records, environment bindings, and the error types shared by trait
//! definitions.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod environment;
pub mod error;
pub mod execution;
pub mod executor;
pub mod workflow;
