use crate::backfill::{BackfillJob, BackfillStatusCallback};
use crate::checkpoint::CheckpointStore;
use crate::error::BackfillJobError;
use crate::key::KeyExtractor;
use crate::migration_table::{LoggingExhaustionHandler, MigrationTable, PendingRetry, ReplayProcessor};
use crate::phase_registry::PhaseRegistry;
use crate::verifier::Verifier;
use async_trait::async_trait;
use db_api::{Database, EngineError, TableModel};
use model::{DataClassPath, HealthStatus, MigrationTableStatus, Phase, RetryConfig, SyncVerificationResult};
use retry_queue::RetryQueue;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use tokio::sync::Mutex as AsyncMutex;

#[async_trait]
trait RetryQueueHandle: Send + Sync {
    async fn stop_gracefully(&self);
}

struct TypedRetryQueueHandle<M: TableModel>(RetryQueue<PendingRetry<M>>);

#[async_trait]
impl<M: TableModel> RetryQueueHandle for TypedRetryQueueHandle<M> {
    async fn stop_gracefully(&self) {
        self.0.stop_gracefully().await;
    }
}

/// Forwards backfill progress to the caller's callback, then mirrors the
/// snapshot into the database-wide status map so [`MigrationDatabase::status`]
/// works without the caller needing to know the entity's model type.
struct StatusRecorder<M: TableModel> {
    table_name: String,
    phases: Arc<PhaseRegistry>,
    statuses: Arc<AsyncMutex<HashMap<String, MigrationTableStatus>>>,
    inner: Arc<dyn BackfillStatusCallback<M>>,
}

#[async_trait]
impl<M: TableModel> BackfillStatusCallback<M> for StatusRecorder<M> {
    async fn on_progress(&self, status: &model::BackfillStatus) {
        self.inner.on_progress(status).await;
        let mut statuses = self.statuses.lock().await;
        statuses.insert(
            self.table_name.clone(),
            MigrationTableStatus {
                table_name: self.table_name.clone(),
                current_phase: self.phases.phase_for(&self.table_name),
                backfill_status: Some(status.clone()),
            },
        );
    }
}

/// Top-level facade over a source and target engine (spec §4.5): caches
/// per-entity [`MigrationTable`] handles, owns the phase registry and every
/// entity's retry queue, and aggregates health and status across both
/// wrapped engines.
pub struct MigrationDatabase<S: Database, T: Database> {
    source: Arc<S>,
    target: Arc<T>,
    phases: Arc<PhaseRegistry>,
    retry_config: RetryConfig,
    tables: AsyncMutex<HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>>,
    backfills: AsyncMutex<HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>>,
    retry_handles: AsyncMutex<Vec<Box<dyn RetryQueueHandle>>>,
    statuses: Arc<AsyncMutex<HashMap<String, MigrationTableStatus>>>,
}

impl<S: Database, T: Database> MigrationDatabase<S, T> {
    pub fn new(source: Arc<S>, target: Arc<T>, default_phase: Phase, retry_config: RetryConfig) -> Self {
        MigrationDatabase {
            source,
            target,
            phases: Arc::new(PhaseRegistry::new(default_phase)),
            retry_config,
            tables: AsyncMutex::new(HashMap::new()),
            backfills: AsyncMutex::new(HashMap::new()),
            retry_handles: AsyncMutex::new(Vec::new()),
            statuses: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    pub fn phase_registry(&self) -> &Arc<PhaseRegistry> {
        &self.phases
    }

    pub async fn connect(&self) -> Result<(), EngineError> {
        self.source.connect().await?;
        self.target.connect().await?;
        Ok(())
    }

    /// Stops every entity's retry queue worker (soft stop — finishes any
    /// in-flight replay first) before disconnecting both engines.
    pub async fn disconnect(&self) -> Result<(), EngineError> {
        for handle in self.retry_handles.lock().await.iter() {
            handle.stop_gracefully().await;
        }
        self.source.disconnect().await?;
        self.target.disconnect().await?;
        Ok(())
    }

    /// Returns the cached [`MigrationTable`] for `name`, creating (and
    /// starting the retry queue for) one on first access.
    pub async fn table<M: TableModel>(&self, name: &str) -> Arc<MigrationTable<M>> {
        let key = (TypeId::of::<M>(), name.to_string());
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.get(&key) {
            return existing
                .clone()
                .downcast::<MigrationTable<M>>()
                .expect("type-keyed table cache entry mismatch");
        }

        let source_table = self.source.table::<M>(name);
        let target_table = self.target.table::<M>(name);
        let retry_queue = RetryQueue::new(self.retry_config);
        retry_queue
            .start(
                ReplayProcessor::<M>::new(),
                LoggingExhaustionHandler {
                    table_name: name.to_string(),
                },
            )
            .await;
        self.retry_handles
            .lock()
            .await
            .push(Box::new(TypedRetryQueueHandle(retry_queue.clone())));

        let table = Arc::new(MigrationTable::new(
            name,
            source_table,
            target_table,
            self.phases.clone(),
            retry_queue,
        ));
        tables.insert(key, table.clone());
        table
    }

    /// Starts (or resumes) a resumable backfill for `name`. Returns
    /// [`BackfillJobError::AlreadyActive`] if one is already running for
    /// this entity.
    pub async fn start_backfill<M, K>(
        &self,
        name: &str,
        id_path: DataClassPath,
        key_extractor: K,
        config: model::BackfillConfig,
        checkpoints: Arc<dyn CheckpointStore>,
        callback: Arc<dyn BackfillStatusCallback<M>>,
    ) -> Result<Arc<BackfillJob<M, K>>, BackfillJobError>
    where
        M: TableModel,
        K: KeyExtractor<M> + Clone + Send + Sync + 'static,
    {
        let recorder: Arc<dyn BackfillStatusCallback<M>> = Arc::new(StatusRecorder {
            table_name: name.to_string(),
            phases: self.phases.clone(),
            statuses: self.statuses.clone(),
            inner: callback,
        });

        // Backfill always copies source -> target directly; it bypasses the
        // phase-aware facade because its job is to populate the target
        // regardless of which engine is currently serving reads/writes.
        let job = Arc::new(BackfillJob::new(
            name,
            self.source.table::<M>(name),
            self.target.table::<M>(name),
            id_path,
            key_extractor,
            config,
            checkpoints,
            recorder,
        ));
        job.start()?;

        let key = (TypeId::of::<M>(), name.to_string());
        self.backfills.lock().await.insert(key, job.clone());
        Ok(job)
    }

    /// Looks up a previously started backfill job by entity name and model
    /// type. Returns `None` if no job with that exact type was ever started.
    pub async fn backfill_job<M, K>(&self, name: &str) -> Option<Arc<BackfillJob<M, K>>>
    where
        M: TableModel,
        K: KeyExtractor<M> + Send + Sync + 'static,
    {
        let key = (TypeId::of::<M>(), name.to_string());
        self.backfills
            .lock()
            .await
            .get(&key)
            .and_then(|job| job.clone().downcast::<BackfillJob<M, K>>().ok())
    }

    pub async fn verify_sync<M, K>(
        &self,
        name: &str,
        id_path: DataClassPath,
        key_extractor: K,
        sample_size: usize,
    ) -> Result<SyncVerificationResult, EngineError>
    where
        M: TableModel,
        K: KeyExtractor<M> + Send + Sync,
    {
        let verifier = Verifier::new(
            name,
            self.source.table::<M>(name),
            self.target.table::<M>(name),
            id_path,
            key_extractor,
        );
        verifier.verify_sync(sample_size).await
    }

    /// Best-effort status snapshot across every entity that has ever run a
    /// backfill in this process. Entities that have only ever been read or
    /// written (no backfill) do not appear here — see `phase_registry` for
    /// their current phase.
    pub async fn status(&self) -> HashMap<String, MigrationTableStatus> {
        self.statuses.lock().await.clone()
    }

    pub async fn table_status(&self, name: &str) -> Option<MigrationTableStatus> {
        self.statuses.lock().await.get(name).cloned()
    }

    /// Combines both wrapped engines' health into the single worse-of
    /// status (spec §9 Q2: ERROR outranks URGENT).
    pub async fn health_check(&self) -> Result<HealthStatus, EngineError> {
        let source_health = self.source.health_check().await?;
        let target_health = self.target.health_check().await?;
        Ok(HealthStatus::worse_of(source_health, target_health))
    }
}
