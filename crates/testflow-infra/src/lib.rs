//! Infrastructure adapters for Testflow.
//!
//! Concrete implementations of the core's trait seams:
//! - `memory` -- in-memory repositories (DashMap)
//! - `engine` -- the in-process [`engine::LocalEngine`] hosting the flow
//!   interpreter, and [`engine::HttpEngineClient`] for remote runners
//! - `leaf` -- leaf executors for `http` (reqwest) and `script` steps
//! - `bindings` -- static in-memory bindings provider

pub mod bindings;
pub mod engine;
pub mod leaf;
pub mod memory;
