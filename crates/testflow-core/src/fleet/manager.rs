//! Executor fleet manager: registration, effective-view listing, engine
//! sync, and strategy-based worker selection.
//!
//! The manager joins the persisted executor table with the engine's live
//! runtime view on every read. Registration handles rebooted workers
//! ("orphans"): a worker that comes back with a new `slave_id` reclaims its
//! old record instead of leaving a dead row behind.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use testflow_types::error::{EngineError, RepositoryError};
use testflow_types::executor::{
    DispatchStrategy, EffectiveExecutor, ExecutorFilter, ExecutorRecord, ExecutorStatus,
    ExecutorType, RuntimeStatus,
};
use uuid::Uuid;

use crate::engine::EngineClient;
use crate::fleet::labels::labels_match;
use crate::repository::ExecutorRepository;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from fleet operations.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// The explicitly requested executor does not exist.
    #[error("executor not found: {0}")]
    NotFound(String),

    /// No executor can accept the dispatch (disabled, offline, or no label
    /// match).
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Registration request
// ---------------------------------------------------------------------------

/// Fields a worker reports when it registers.
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub slave_id: String,
    pub name: Option<String>,
    pub executor_type: Option<ExecutorType>,
    pub labels: Option<BTreeMap<String, String>>,
}

// ---------------------------------------------------------------------------
// FleetManager
// ---------------------------------------------------------------------------

/// Fleet manager over an executor repository and the engine's worker view.
pub struct FleetManager<X: ExecutorRepository, E: EngineClient> {
    repo: Arc<X>,
    engine: Arc<E>,
}

impl<X: ExecutorRepository, E: EngineClient> FleetManager<X, E> {
    pub fn new(repo: Arc<X>, engine: Arc<E>) -> Self {
        Self { repo, engine }
    }

    /// Register a worker.
    ///
    /// - A record with the same `slave_id` is updated in place.
    /// - Otherwise an offline "orphan" record is reclaimed: a record with the
    ///   same name is preferred, falling back to the most-recently-updated
    ///   offline record. The orphan keeps its record ID but moves to the new
    ///   `slave_id`.
    /// - Otherwise a new record is created with defaults
    ///   (`type=normal`, `name=slave_id`, `status=enabled`, `priority=0`).
    pub async fn register(&self, request: RegisterRequest) -> Result<ExecutorRecord, FleetError> {
        let now = Utc::now();

        if let Some(mut existing) = self.repo.get(&request.slave_id).await? {
            apply_request_fields(&mut existing, &request);
            existing.updated_at = now;
            self.repo.upsert(&existing).await?;
            tracing::info!(slave_id = existing.slave_id.as_str(), "executor re-registered");
            return Ok(existing);
        }

        if let Some(orphan) = self.find_orphan(&request).await? {
            let old_slave_id = orphan.slave_id.clone();
            let mut record = orphan;
            record.slave_id = request.slave_id.clone();
            apply_request_fields(&mut record, &request);
            record.updated_at = now;

            self.repo.delete(&old_slave_id).await?;
            self.repo.upsert(&record).await?;
            tracing::info!(
                old_slave_id = old_slave_id.as_str(),
                slave_id = record.slave_id.as_str(),
                "reassigned offline executor record to rebooted worker"
            );
            return Ok(record);
        }

        let mut record = ExecutorRecord {
            id: Uuid::now_v7(),
            slave_id: request.slave_id.clone(),
            name: request.slave_id.clone(),
            executor_type: ExecutorType::Normal,
            labels: BTreeMap::new(),
            max_vus: 0,
            priority: 0,
            status: ExecutorStatus::Enabled,
            created_at: now,
            updated_at: now,
        };
        apply_request_fields(&mut record, &request);
        self.repo.upsert(&record).await?;
        tracing::info!(slave_id = record.slave_id.as_str(), "executor registered");
        Ok(record)
    }

    /// Find an offline record to reclaim for a rebooted worker.
    ///
    /// Among records whose runtime state is currently offline, prefer one
    /// whose name matches the registering worker's name; otherwise take the
    /// most-recently-updated one.
    async fn find_orphan(
        &self,
        request: &RegisterRequest,
    ) -> Result<Option<ExecutorRecord>, FleetError> {
        let runtime = self.runtime_by_slave_id().await?;
        let mut offline: Vec<ExecutorRecord> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|record| {
                runtime
                    .get(&record.slave_id)
                    .map(|status| !status.state.is_available())
                    .unwrap_or(true)
            })
            .collect();

        if offline.is_empty() {
            return Ok(None);
        }

        offline.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if let Some(name) = &request.name {
            if let Some(by_name) = offline.iter().find(|record| &record.name == name) {
                return Ok(Some(by_name.clone()));
            }
        }
        Ok(offline.into_iter().next())
    }

    /// List executors in effective view, filtered and ordered by
    /// priority DESC, id DESC.
    pub async fn list(&self, filter: &ExecutorFilter) -> Result<Vec<EffectiveExecutor>, FleetError> {
        let runtime = self.runtime_by_slave_id().await?;
        let mut executors: Vec<EffectiveExecutor> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|record| matches_filter(record, filter))
            .map(|record| {
                let runtime = runtime.get(&record.slave_id).cloned();
                EffectiveExecutor { record, runtime }
            })
            .collect();

        executors.sort_by(|a, b| {
            b.record
                .priority
                .cmp(&a.record.priority)
                .then(b.record.id.cmp(&a.record.id))
        });
        Ok(executors)
    }

    /// Pull the engine's worker list and create records for unknown
    /// `slave_id`s. Returns the number of records created.
    pub async fn sync(&self) -> Result<u32, FleetError> {
        let known: HashMap<String, ExecutorRecord> = self
            .repo
            .list()
            .await?
            .into_iter()
            .map(|record| (record.slave_id.clone(), record))
            .collect();

        let mut created = 0u32;
        let now = Utc::now();
        for status in self.engine.list_workers().await? {
            if known.contains_key(&status.slave_id) {
                continue;
            }
            let record = ExecutorRecord {
                id: Uuid::now_v7(),
                slave_id: status.slave_id.clone(),
                name: status.slave_id.clone(),
                executor_type: ExecutorType::Normal,
                labels: BTreeMap::new(),
                max_vus: 0,
                priority: 0,
                status: ExecutorStatus::Enabled,
                created_at: now,
                updated_at: now,
            };
            self.repo.upsert(&record).await?;
            created += 1;
        }

        if created > 0 {
            tracing::info!(created, "synced new executors from engine");
        }
        Ok(created)
    }

    /// Choose a worker for a dispatch strategy.
    ///
    /// - `local`: returns `None`; the caller runs on its own host.
    /// - `manual`: the named executor must exist, be enabled, and be online
    ///   or busy.
    /// - `auto`: lowest-load enabled executor in state online/busy whose
    ///   labels cover the requested labels.
    pub async fn select(
        &self,
        strategy: &DispatchStrategy,
    ) -> Result<Option<EffectiveExecutor>, FleetError> {
        match strategy {
            DispatchStrategy::Local => Ok(None),
            DispatchStrategy::Manual { slave_id } => {
                let record = self
                    .repo
                    .get(slave_id)
                    .await?
                    .ok_or_else(|| FleetError::NotFound(slave_id.clone()))?;
                let runtime = self.runtime_by_slave_id().await?.remove(slave_id);
                let executor = EffectiveExecutor { record, runtime };
                if !executor.is_dispatchable() {
                    return Err(FleetError::Unavailable(format!(
                        "executor '{slave_id}' is {} and {:?}",
                        match executor.record.status {
                            ExecutorStatus::Enabled => "enabled",
                            ExecutorStatus::Disabled => "disabled",
                        },
                        executor.state()
                    )));
                }
                Ok(Some(executor))
            }
            DispatchStrategy::Auto { labels } => {
                let candidates = self.list(&ExecutorFilter::default()).await?;
                let best = candidates
                    .into_iter()
                    .filter(|executor| executor.is_dispatchable())
                    .filter(|executor| labels_match(&executor.record.labels, labels))
                    .min_by(|a, b| {
                        a.load()
                            .partial_cmp(&b.load())
                            .unwrap_or(Ordering::Equal)
                    });
                match best {
                    Some(executor) => Ok(Some(executor)),
                    None => Err(FleetError::Unavailable(format!(
                        "no enabled online executor matches labels {labels:?}"
                    ))),
                }
            }
        }
    }

    async fn runtime_by_slave_id(&self) -> Result<HashMap<String, RuntimeStatus>, FleetError> {
        Ok(self
            .engine
            .list_workers()
            .await?
            .into_iter()
            .map(|status| (status.slave_id.clone(), status))
            .collect())
    }
}

fn apply_request_fields(record: &mut ExecutorRecord, request: &RegisterRequest) {
    if let Some(name) = &request.name {
        record.name = name.clone();
    }
    if let Some(executor_type) = request.executor_type {
        record.executor_type = executor_type;
    }
    if let Some(labels) = &request.labels {
        record.labels = labels.clone();
    }
}

fn matches_filter(record: &ExecutorRecord, filter: &ExecutorFilter) -> bool {
    if let Some(fragment) = &filter.name_contains {
        if !record.name.contains(fragment.as_str()) {
            return false;
        }
    }
    if let Some(executor_type) = filter.executor_type {
        if record.executor_type != executor_type {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if record.status != status {
            return false;
        }
    }
    labels_match(&record.labels, &filter.labels)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
