use crate::checkpoint::CheckpointStore;
use crate::error::BackfillJobError;
use crate::key::KeyExtractor;
use async_trait::async_trait;
use chrono::Utc;
use db_api::{Table, TableModel};
use model::{
    BackfillConfig, BackfillError, BackfillState, BackfillStatus, Condition, Modification, SortPart,
    Value,
};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Observes a backfill's progress after each processed batch (spec §4.3,
/// the status-callback integration seam).
#[async_trait]
pub trait BackfillStatusCallback<M: TableModel>: Send + Sync {
    async fn on_progress(&self, status: &BackfillStatus);
}

/// No-op default, used when a caller only wants to poll `status()`.
pub struct NoopStatusCallback;

#[async_trait]
impl<M: TableModel> BackfillStatusCallback<M> for NoopStatusCallback {
    async fn on_progress(&self, _status: &BackfillStatus) {}
}

/// Resumable, checkpointed, paged copy of one entity from source to target
/// (spec §4.3). Upserts rather than inserts so re-running a batch after a
/// crash is safe.
pub struct BackfillJob<M: TableModel, K: KeyExtractor<M>> {
    table_name: String,
    source: Arc<dyn Table<M>>,
    target: Arc<dyn Table<M>>,
    id_path: model::DataClassPath,
    key_extractor: K,
    config: BackfillConfig,
    checkpoints: Arc<dyn CheckpointStore>,
    callback: Arc<dyn BackfillStatusCallback<M>>,
    status: Arc<Mutex<BackfillStatus>>,
    cancel: CancellationToken,
    pause: CancellationToken,
    handle: Mutex<Option<JoinHandle<BackfillStatus>>>,
}

impl<M: TableModel, K: KeyExtractor<M> + Clone + 'static> BackfillJob<M, K> {
    pub fn new(
        table_name: impl Into<String>,
        source: Arc<dyn Table<M>>,
        target: Arc<dyn Table<M>>,
        id_path: model::DataClassPath,
        key_extractor: K,
        config: BackfillConfig,
        checkpoints: Arc<dyn CheckpointStore>,
        callback: Arc<dyn BackfillStatusCallback<M>>,
    ) -> Self {
        BackfillJob {
            table_name: table_name.into(),
            source,
            target,
            id_path,
            key_extractor,
            config,
            checkpoints,
            callback,
            status: Arc::new(Mutex::new(BackfillStatus::new(Utc::now()))),
            cancel: CancellationToken::new(),
            pause: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn status(&self) -> BackfillStatus {
        self.status.lock().unwrap().clone()
    }

    /// Starts (or resumes from a `Paused` state) the backfill loop as a
    /// background task. Returns [`BackfillJobError::AlreadyActive`] if a
    /// run is already in flight.
    pub fn start(self: &Arc<Self>) -> Result<(), BackfillJobError> {
        let mut handle_slot = self.handle.lock().unwrap();
        if handle_slot.is_some() {
            return Err(BackfillJobError::AlreadyActive);
        }

        {
            let mut status = self.status.lock().unwrap();
            if status.started_at.is_none() {
                status.started_at = Some(Utc::now());
            }
            status.state = BackfillState::InProgress;
        }

        let job = Arc::clone(self);
        *handle_slot = Some(tokio::spawn(async move { job.run().await }));
        Ok(())
    }

    /// Cooperative pause: the run loop checks this between rows and batches
    /// and exits leaving `state = Paused`, preserving the checkpoint. A
    /// subsequent `start()` resumes from it.
    pub fn pause(&self) {
        self.pause.cancel();
    }

    /// Hard stop: the run loop exits and leaves `state = Failed` with no
    /// further checkpoint writes. Distinct from `pause` in that a cancelled
    /// job is not expected to be resumed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn await_completion(&self) -> BackfillStatus {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(status) => return status,
                Err(err) => error!(table = %self.table_name, error = %err, "backfill task panicked"),
            }
        }
        self.status()
    }

    async fn run(self: Arc<Self>) -> BackfillStatus {
        if let Some(estimate) = self.estimate_total().await {
            self.status.lock().unwrap().total_estimate = Some(estimate);
        }

        let resume_from = match self.checkpoints.load(&self.table_name).await {
            Ok(Some(raw)) => serde_json::from_str::<Value>(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(table = %self.table_name, error = %err, "failed to load checkpoint, starting from beginning");
                None
            }
        };
        if let Some(cursor) = &resume_from {
            self.status.lock().unwrap().last_processed_id = Some(value_to_cursor_string(cursor));
        }

        let final_state = self.copy_loop(resume_from).await;

        let mut status = self.status.lock().unwrap();
        status.state = final_state;
        status.updated_at = Utc::now();
        if final_state == BackfillState::Completed {
            status.completed_at = Some(Utc::now());
        }
        tracing::info!(
            table = %self.table_name,
            state = ?final_state,
            processed = status.processed_count,
            errors = status.error_count,
            "backfill run finished"
        );
        status.clone()
    }

    async fn estimate_total(&self) -> Option<u64> {
        self.source.count(Condition::Always).await.ok()
    }

    async fn copy_loop(&self, mut cursor: Option<Value>) -> BackfillState {
        loop {
            if self.cancel.is_cancelled() {
                return BackfillState::Failed;
            }
            if self.pause.is_cancelled() {
                return BackfillState::Paused;
            }

            let condition = match &cursor {
                Some(last) => Condition::greater_than(self.id_path.clone(), last.clone()),
                None => Condition::Always,
            };
            let order_by = vec![SortPart::ascending(self.id_path.clone())];

            let batch = match self
                .source
                .find(condition, order_by, Some(self.config.batch_size))
                .await
            {
                Ok(rows) => rows,
                Err(err) => {
                    error!(table = %self.table_name, error = %err, "backfill batch read failed");
                    return BackfillState::Failed;
                }
            };

            if batch.is_empty() {
                return BackfillState::Completed;
            }

            for row in &batch {
                if self.cancel.is_cancelled() {
                    return BackfillState::Failed;
                }
                if self.pause.is_cancelled() {
                    self.persist_checkpoint(&cursor).await;
                    return BackfillState::Paused;
                }

                let Some(id) = self.key_extractor.extract(row) else {
                    self.record_error("<unknown>", "record has no id".to_string());
                    if self.should_pause_for_errors() {
                        self.persist_checkpoint(&cursor).await;
                        return BackfillState::Paused;
                    }
                    continue;
                };

                match self
                    .target
                    .upsert_one(
                        Condition::equals(self.id_path.clone(), id.clone()),
                        Modification::Assign(serde_json::to_value(row).unwrap_or(serde_json::Value::Null)),
                        row.clone(),
                    )
                    .await
                {
                    Ok(_) => {
                        cursor = Some(id.clone());
                        let mut status = self.status.lock().unwrap();
                        status.processed_count += 1;
                        status.last_processed_id = Some(value_to_cursor_string(&id));
                        status.updated_at = Utc::now();
                    }
                    Err(err) => {
                        self.record_error(&value_to_cursor_string(&id), err.to_string());
                        if !self.config.continue_on_error || self.should_pause_for_errors() {
                            self.persist_checkpoint(&cursor).await;
                            return BackfillState::Paused;
                        }
                    }
                }
            }

            self.persist_checkpoint(&cursor).await;
            self.callback.on_progress(&self.status()).await;

            if self.config.delay_between_batches_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.delay_between_batches_ms,
                ))
                .await;
            }
        }
    }

    fn should_pause_for_errors(&self) -> bool {
        self.status.lock().unwrap().error_count >= self.config.max_errors_before_pause as u64
    }

    fn record_error(&self, record_id: &str, message: String) {
        let mut status = self.status.lock().unwrap();
        status.error_count += 1;
        status.push_error(
            BackfillError {
                record_id: record_id.to_string(),
                message,
                timestamp: Utc::now(),
            },
            self.config.max_errors_to_retain,
        );
    }

    async fn persist_checkpoint(&self, cursor: &Option<Value>) {
        let Some(cursor) = cursor else { return };
        let Ok(serialized) = serde_json::to_string(cursor) else {
            return;
        };
        if let Err(err) = self.checkpoints.save(&self.table_name, &serialized).await {
            warn!(table = %self.table_name, error = %err, "failed to persist backfill checkpoint");
        }
    }
}

/// Renders a checkpoint cursor for display in `BackfillStatus`. Plain
/// strings render bare; anything else falls back to its JSON form.
fn value_to_cursor_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::key::FnKeyExtractor;
    use db_api::{EngineError, MutationResult};
    use model::{AggregateOp, Condition, DataClassPath, Value};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, serde::Serialize, serde::Deserialize)]
    struct Row {
        id: i64,
        name: String,
    }

    struct InMemoryTable {
        rows: StdMutex<Vec<Row>>,
    }

    #[async_trait]
    impl Table<Row> for InMemoryTable {
        async fn insert(&self, models: Vec<Row>) -> Result<Vec<Row>, EngineError> {
            self.rows.lock().unwrap().extend(models.clone());
            Ok(models)
        }
        async fn replace_one(
            &self,
            _c: Condition,
            _m: Row,
            _o: Vec<SortPart>,
        ) -> Result<MutationResult<Row>, EngineError> {
            Ok(MutationResult { before: None, after: None })
        }
        async fn upsert_one(
            &self,
            condition: Condition,
            _modification: Modification,
            model: Row,
        ) -> Result<Option<Row>, EngineError> {
            let mut rows = self.rows.lock().unwrap();
            if let Condition::Equals(_, Value::Int(id)) = &condition {
                if let Some(existing) = rows.iter_mut().find(|r| r.id == *id) {
                    *existing = model.clone();
                    return Ok(Some(model));
                }
            }
            rows.push(model.clone());
            Ok(Some(model))
        }
        async fn update_one(
            &self,
            _c: Condition,
            _m: Modification,
            _o: Vec<SortPart>,
        ) -> Result<MutationResult<Row>, EngineError> {
            Ok(MutationResult { before: None, after: None })
        }
        async fn update_many(&self, _c: Condition, _m: Modification) -> Result<u64, EngineError> {
            Ok(0)
        }
        async fn delete_one(&self, _c: Condition, _o: Vec<SortPart>) -> Result<Option<Row>, EngineError> {
            Ok(None)
        }
        async fn delete_many(&self, _c: Condition) -> Result<u64, EngineError> {
            Ok(0)
        }
        async fn find(
            &self,
            condition: Condition,
            _order_by: Vec<SortPart>,
            limit: Option<usize>,
        ) -> Result<Vec<Row>, EngineError> {
            let rows = self.rows.lock().unwrap();
            let mut out: Vec<Row> = match condition {
                Condition::Always => rows.clone(),
                Condition::GreaterThan(_, Value::Int(threshold)) => {
                    rows.iter().filter(|r| r.id > threshold).cloned().collect()
                }
                _ => rows.clone(),
            };
            out.sort_by_key(|r| r.id);
            if let Some(limit) = limit {
                out.truncate(limit);
            }
            Ok(out)
        }
        async fn find_partial(
            &self,
            _c: Condition,
            _f: Vec<DataClassPath>,
            _o: Vec<SortPart>,
            _l: Option<usize>,
        ) -> Result<Vec<serde_json::Value>, EngineError> {
            Ok(vec![])
        }
        async fn count(&self, _c: Condition) -> Result<u64, EngineError> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }
        async fn group_count(
            &self,
            _c: Condition,
            _g: DataClassPath,
        ) -> Result<HashMap<String, u64>, EngineError> {
            Ok(HashMap::new())
        }
        async fn aggregate(
            &self,
            _c: Condition,
            _f: DataClassPath,
            _o: AggregateOp,
        ) -> Result<Option<Value>, EngineError> {
            Ok(None)
        }
        async fn group_aggregate(
            &self,
            _c: Condition,
            _g: DataClassPath,
            _f: DataClassPath,
            _o: AggregateOp,
        ) -> Result<HashMap<String, Value>, EngineError> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn copies_all_rows_and_completes() {
        let source = Arc::new(InMemoryTable {
            rows: StdMutex::new((0..5).map(|i| Row { id: i, name: format!("row{i}") }).collect()),
        });
        let target = Arc::new(InMemoryTable { rows: StdMutex::new(vec![]) });

        let job = Arc::new(BackfillJob::new(
            "rows",
            source.clone() as Arc<dyn Table<Row>>,
            target.clone() as Arc<dyn Table<Row>>,
            DataClassPath::new("id"),
            FnKeyExtractor::new(|r: &Row| Some(Value::Int(r.id))),
            BackfillConfig { batch_size: 2, ..Default::default() },
            Arc::new(InMemoryCheckpointStore::default()),
            Arc::new(NoopStatusCallback),
        ));

        job.start().unwrap();
        let status = job.await_completion().await;

        assert_eq!(status.state, BackfillState::Completed);
        assert_eq!(status.processed_count, 5);
        assert_eq!(target.rows.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn resumes_from_checkpoint() {
        let source = Arc::new(InMemoryTable {
            rows: StdMutex::new((0..4).map(|i| Row { id: i, name: format!("row{i}") }).collect()),
        });
        let target = Arc::new(InMemoryTable { rows: StdMutex::new(vec![]) });
        let checkpoints = Arc::new(InMemoryCheckpointStore::default());
        checkpoints
            .save("rows", &serde_json::to_string(&Value::Int(1)).unwrap())
            .await
            .unwrap();

        let job = Arc::new(BackfillJob::new(
            "rows",
            source.clone() as Arc<dyn Table<Row>>,
            target.clone() as Arc<dyn Table<Row>>,
            DataClassPath::new("id"),
            FnKeyExtractor::new(|r: &Row| Some(Value::Int(r.id))),
            BackfillConfig::default(),
            checkpoints,
            Arc::new(NoopStatusCallback),
        ));

        job.start().unwrap();
        let status = job.await_completion().await;

        assert_eq!(status.state, BackfillState::Completed);
        // Rows with id <= 1 were already migrated before this run started.
        assert_eq!(target.rows.lock().unwrap().len(), 2);
    }
}
