//! In-memory executor record repository backed by `DashMap`, keyed by
//! `slave_id`.

use dashmap::DashMap;
use testflow_core::repository::ExecutorRepository;
use testflow_types::error::RepositoryError;
use testflow_types::executor::ExecutorRecord;

/// In-memory implementation of [`ExecutorRepository`].
#[derive(Default)]
pub struct InMemoryExecutorRepository {
    records: DashMap<String, ExecutorRecord>,
}

impl InMemoryExecutorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutorRepository for InMemoryExecutorRepository {
    async fn upsert(&self, record: &ExecutorRecord) -> Result<(), RepositoryError> {
        self.records
            .insert(record.slave_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, slave_id: &str) -> Result<Option<ExecutorRecord>, RepositoryError> {
        Ok(self.records.get(slave_id).map(|entry| entry.clone()))
    }

    async fn list(&self) -> Result<Vec<ExecutorRecord>, RepositoryError> {
        Ok(self.records.iter().map(|entry| entry.clone()).collect())
    }

    async fn delete(&self, slave_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.records.remove(slave_id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
