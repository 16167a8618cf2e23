use crate::phase_registry::PhaseRegistry;
use async_trait::async_trait;
use db_api::{EngineError, MutationResult, Table, TableModel};
use model::{AggregateOp, Condition, DataClassPath, Engine, Modification, RetryOperation, SortPart, Value};
use retry_queue::{ExhaustionHandler, RetryProcessor, RetryQueue};
use std::{collections::HashMap, sync::Arc};
use tracing::warn;

/// A queued [`RetryOperation`] bound to the concrete engine it must be
/// replayed against. Captured at enqueue time rather than re-resolved from
/// the current phase at retry time, since a phase flip between enqueue and
/// replay must not retarget an in-flight retry to the wrong engine.
pub struct PendingRetry<M: TableModel> {
    pub op: RetryOperation<M>,
    pub engine: Arc<dyn Table<M>>,
}

/// Re-executes a [`RetryOperation`] against an engine — used both for the
/// inline secondary attempt and by the retry queue's worker.
pub async fn run_retry_operation<M: TableModel>(
    table: &dyn Table<M>,
    op: RetryOperation<M>,
) -> Result<(), EngineError> {
    match op {
        RetryOperation::Insert(models) => table.insert(models).await.map(|_| ()),
        RetryOperation::Replace {
            condition,
            model,
            order_by,
        } => table
            .replace_one_ignoring_result(condition, model, order_by)
            .await,
        RetryOperation::Upsert {
            condition,
            modification,
            model,
        } => table.upsert_one_ignoring_result(condition, modification, model).await,
        RetryOperation::UpdateOne {
            condition,
            modification,
            order_by,
        } => {
            table
                .update_one_ignoring_result(condition, modification, order_by)
                .await
        }
        RetryOperation::UpdateMany {
            condition,
            modification,
        } => table.update_many_ignoring_result(condition, modification).await,
        RetryOperation::DeleteOne { condition, order_by } => {
            table.delete_one_ignoring_old(condition, order_by).await
        }
        RetryOperation::DeleteMany { condition } => table.delete_many_ignoring_old(condition).await,
    }
}

/// Drives the retry queue's worker: replays each [`PendingRetry`] against
/// the engine it was captured with.
pub struct ReplayProcessor<M: TableModel> {
    _marker: std::marker::PhantomData<fn(M)>,
}

impl<M: TableModel> ReplayProcessor<M> {
    pub fn new() -> Self {
        ReplayProcessor {
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<M: TableModel> RetryProcessor<PendingRetry<M>> for ReplayProcessor<M> {
    async fn process(&self, payload: &PendingRetry<M>) -> Result<(), String> {
        run_retry_operation(payload.engine.as_ref(), payload.op.clone())
            .await
            .map_err(|e| e.to_string())
    }
}

/// Logs a secondary write that exhausted every retry attempt (spec §4.1:
/// "the operation is dropped; nothing re-queues it"). The entity's caller
/// is never notified — by the time a retry exhausts, the primary write
/// already returned successfully.
pub struct LoggingExhaustionHandler {
    pub table_name: String,
}

#[async_trait]
impl<M: TableModel> ExhaustionHandler<PendingRetry<M>> for LoggingExhaustionHandler {
    async fn on_max_retries_exceeded(&self, item: retry_queue::QueuedItem<PendingRetry<M>>) {
        warn!(
            table = %self.table_name,
            op = item.payload.op.kind(),
            attempts = item.attempt_count,
            error = item.last_error.as_deref().unwrap_or("unknown"),
            "secondary write exhausted retries, dropping"
        );
    }
}

/// Transparent `Table<M>` facade that routes every call to the source
/// and/or target engine according to the entity's current phase (spec
/// §4.2). The phase is read exactly once per call, at the top, so a single
/// operation is never split across a phase change (§5, §9 re-architecture
/// notes).
pub struct MigrationTable<M: TableModel> {
    table_name: String,
    source: Arc<dyn Table<M>>,
    target: Arc<dyn Table<M>>,
    phases: Arc<PhaseRegistry>,
    retry_queue: RetryQueue<PendingRetry<M>>,
}

impl<M: TableModel> MigrationTable<M> {
    pub fn new(
        table_name: impl Into<String>,
        source: Arc<dyn Table<M>>,
        target: Arc<dyn Table<M>>,
        phases: Arc<PhaseRegistry>,
        retry_queue: RetryQueue<PendingRetry<M>>,
    ) -> Self {
        MigrationTable {
            table_name: table_name.into(),
            source,
            target,
            phases,
            retry_queue,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn retry_queue(&self) -> &RetryQueue<PendingRetry<M>> {
        &self.retry_queue
    }

    fn engine_table(&self, engine: Engine) -> Arc<dyn Table<M>> {
        match engine {
            Engine::Source => self.source.clone(),
            Engine::Target => self.target.clone(),
        }
    }

    fn phase_route(&self) -> (Arc<dyn Table<M>>, Option<Arc<dyn Table<M>>>) {
        let route = self.phases.phase_for(&self.table_name).write_route();
        let primary = self.engine_table(route.primary);
        let secondary = route.secondary.map(|e| self.engine_table(e));
        (primary, secondary)
    }

    fn read_table(&self) -> Arc<dyn Table<M>> {
        let engine = self.phases.phase_for(&self.table_name).read_engine();
        self.engine_table(engine)
    }

    /// Fires `retry_op` at `secondary` without blocking the caller (spec
    /// §1: the secondary engine must never delay the primary write). On
    /// failure the operation is handed to the per-entity retry queue for
    /// bounded, backed-off replay (I3).
    fn propagate_secondary(&self, secondary: Arc<dyn Table<M>>, retry_op: RetryOperation<M>) {
        let table_name = self.table_name.clone();
        let retry_queue = self.retry_queue.clone();
        tokio::spawn(async move {
            let outcome = run_retry_operation(secondary.as_ref(), retry_op.clone()).await;
            if let Err(err) = outcome {
                warn!(
                    table = %table_name,
                    op = retry_op.kind(),
                    error = %err,
                    "secondary write failed, queuing for retry"
                );
                retry_queue
                    .enqueue(PendingRetry {
                        op: retry_op,
                        engine: secondary,
                    })
                    .await;
            }
        });
    }
}

#[async_trait]
impl<M: TableModel> Table<M> for MigrationTable<M> {
    async fn insert(&self, models: Vec<M>) -> Result<Vec<M>, EngineError> {
        let (primary, secondary) = self.phase_route();
        let inserted = primary.insert(models).await?;
        if let Some(secondary) = secondary {
            // I4: the secondary replay carries the primary's post-insert
            // (server-assigned) values, never the caller's raw inputs.
            self.propagate_secondary(secondary, RetryOperation::Insert(inserted.clone()));
        }
        Ok(inserted)
    }

    async fn replace_one(
        &self,
        condition: Condition,
        model: M,
        order_by: Vec<SortPart>,
    ) -> Result<MutationResult<M>, EngineError> {
        let (primary, secondary) = self.phase_route();
        let result = primary
            .replace_one(condition.clone(), model.clone(), order_by.clone())
            .await?;
        if let Some(secondary) = secondary {
            self.propagate_secondary(
                secondary,
                RetryOperation::Replace {
                    condition,
                    model,
                    order_by,
                },
            );
        }
        Ok(result)
    }

    async fn upsert_one(
        &self,
        condition: Condition,
        modification: Modification,
        model: M,
    ) -> Result<Option<M>, EngineError> {
        let (primary, secondary) = self.phase_route();
        let result = primary
            .upsert_one(condition.clone(), modification.clone(), model.clone())
            .await?;
        if let Some(secondary) = secondary {
            self.propagate_secondary(
                secondary,
                RetryOperation::Upsert {
                    condition,
                    modification,
                    model,
                },
            );
        }
        Ok(result)
    }

    async fn update_one(
        &self,
        condition: Condition,
        modification: Modification,
        order_by: Vec<SortPart>,
    ) -> Result<MutationResult<M>, EngineError> {
        let (primary, secondary) = self.phase_route();
        let result = primary
            .update_one(condition.clone(), modification.clone(), order_by.clone())
            .await?;
        if let Some(secondary) = secondary {
            self.propagate_secondary(
                secondary,
                RetryOperation::UpdateOne {
                    condition,
                    modification,
                    order_by,
                },
            );
        }
        Ok(result)
    }

    async fn update_many(
        &self,
        condition: Condition,
        modification: Modification,
    ) -> Result<u64, EngineError> {
        let (primary, secondary) = self.phase_route();
        let result = primary
            .update_many(condition.clone(), modification.clone())
            .await?;
        if let Some(secondary) = secondary {
            self.propagate_secondary(
                secondary,
                RetryOperation::UpdateMany {
                    condition,
                    modification,
                },
            );
        }
        Ok(result)
    }

    async fn delete_one(
        &self,
        condition: Condition,
        order_by: Vec<SortPart>,
    ) -> Result<Option<M>, EngineError> {
        let (primary, secondary) = self.phase_route();
        let result = primary
            .delete_one(condition.clone(), order_by.clone())
            .await?;
        if let Some(secondary) = secondary {
            self.propagate_secondary(secondary, RetryOperation::DeleteOne { condition, order_by });
        }
        Ok(result)
    }

    async fn delete_many(&self, condition: Condition) -> Result<u64, EngineError> {
        let (primary, secondary) = self.phase_route();
        let result = primary.delete_many(condition.clone()).await?;
        if let Some(secondary) = secondary {
            self.propagate_secondary(secondary, RetryOperation::DeleteMany { condition });
        }
        Ok(result)
    }

    async fn find(
        &self,
        condition: Condition,
        order_by: Vec<SortPart>,
        limit: Option<usize>,
    ) -> Result<Vec<M>, EngineError> {
        self.read_table().find(condition, order_by, limit).await
    }

    async fn find_partial(
        &self,
        condition: Condition,
        fields: Vec<DataClassPath>,
        order_by: Vec<SortPart>,
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, EngineError> {
        self.read_table()
            .find_partial(condition, fields, order_by, limit)
            .await
    }

    async fn count(&self, condition: Condition) -> Result<u64, EngineError> {
        self.read_table().count(condition).await
    }

    async fn group_count(
        &self,
        condition: Condition,
        group_by: DataClassPath,
    ) -> Result<HashMap<String, u64>, EngineError> {
        self.read_table().group_count(condition, group_by).await
    }

    async fn aggregate(
        &self,
        condition: Condition,
        field: DataClassPath,
        op: AggregateOp,
    ) -> Result<Option<Value>, EngineError> {
        self.read_table().aggregate(condition, field, op).await
    }

    async fn group_aggregate(
        &self,
        condition: Condition,
        group_by: DataClassPath,
        field: DataClassPath,
        op: AggregateOp,
    ) -> Result<HashMap<String, Value>, EngineError> {
        self.read_table()
            .group_aggregate(condition, group_by, field, op)
            .await
    }

    async fn find_similar(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<M>, EngineError> {
        self.read_table().find_similar(vector, limit).await
    }

    async fn find_similar_sparse(
        &self,
        indices: Vec<u32>,
        values: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<M>, EngineError> {
        self.read_table()
            .find_similar_sparse(indices, values, limit)
            .await
    }
}
