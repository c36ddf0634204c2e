//! Repository trait definitions ("ports") implemented by the infrastructure
//! layer.

pub mod executor;
pub mod workflow;

pub use executor::ExecutorRepository;
pub use workflow::{WorkflowRepository, update_workflow};
