//! Execution supervisor: the submission pipeline, operator actions, and the
//! background monitor that drives executions to terminal states.

pub mod monitor;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use supervisor::{ExecutionSupervisor, SupervisorError};
