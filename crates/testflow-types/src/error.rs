//! Error types shared by trait definitions in testflow-core.

use thiserror::Error;

/// Errors from repository operations (used by trait definitions in testflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("illegal status transition: {0}")]
    IllegalTransition(String),
}

/// Errors from engine RPC calls (submission, polling, actions).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine transport error: {0}")]
    Transport(String),

    #[error("engine rejected submission: {0}")]
    Rejected(String),

    #[error("engine execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("operation not supported by this engine: {0}")]
    Unsupported(String),

    #[error("malformed engine response: {0}")]
    Protocol(String),
}
