//! Executor record repository trait definition.
//!
//! Stores the persisted half of the fleet's effective view. Records are
//! keyed by `slave_id`; mutations are serialized per key by the
//! implementation.

use testflow_types::error::RepositoryError;
use testflow_types::executor::ExecutorRecord;

/// Repository trait for executor record persistence.
pub trait ExecutorRepository: Send + Sync {
    /// Insert or replace a record by `slave_id`.
    fn upsert(
        &self,
        record: &ExecutorRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a record by `slave_id`.
    fn get(
        &self,
        slave_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ExecutorRecord>, RepositoryError>> + Send;

    /// List all records.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutorRecord>, RepositoryError>> + Send;

    /// Delete a record by `slave_id`. Returns `true` if it existed.
    fn delete(
        &self,
        slave_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
