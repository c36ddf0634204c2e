//! Executor fleet manager: persisted records joined with live runtime
//! status, and worker selection by dispatch strategy.

pub mod labels;
pub mod manager;

pub use labels::labels_match;
pub use manager::{FleetError, FleetManager, RegisterRequest};
