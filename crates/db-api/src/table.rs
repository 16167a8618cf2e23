use crate::error::EngineError;
use async_trait::async_trait;
use model::{AggregateOp, Condition, DataClassPath, Modification, SortPart, Value};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;

/// Blanket bound satisfied by any record type the facade can carry: it must
/// be cheaply cloneable (the facade hands the same model to both the
/// primary write and the queued secondary replay) and serializable (so it
/// can ride inside a [`model::RetryOperation`] or a backfill batch).
pub trait TableModel: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}
impl<T> TableModel for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Result of a `replaceOne`/`updateOne`-shaped mutation: the row's state
/// immediately before and after the call, where available.
#[derive(Debug, Clone)]
pub struct MutationResult<M> {
    pub before: Option<M>,
    pub after: Option<M>,
}

/// The full structured, query-DSL-based table surface exposed by both the
/// source and target engines (spec §6). The migration core never implements
/// this trait itself for a *live* backend — it is supplied by whatever
/// storage engine is being wrapped.
#[async_trait]
pub trait Table<M: TableModel>: Send + Sync {
    async fn insert(&self, models: Vec<M>) -> Result<Vec<M>, EngineError>;

    async fn replace_one(
        &self,
        condition: Condition,
        model: M,
        order_by: Vec<SortPart>,
    ) -> Result<MutationResult<M>, EngineError>;

    async fn replace_one_ignoring_result(
        &self,
        condition: Condition,
        model: M,
        order_by: Vec<SortPart>,
    ) -> Result<(), EngineError> {
        self.replace_one(condition, model, order_by).await?;
        Ok(())
    }

    async fn upsert_one(
        &self,
        condition: Condition,
        modification: Modification,
        model: M,
    ) -> Result<Option<M>, EngineError>;

    async fn upsert_one_ignoring_result(
        &self,
        condition: Condition,
        modification: Modification,
        model: M,
    ) -> Result<(), EngineError> {
        self.upsert_one(condition, modification, model).await?;
        Ok(())
    }

    async fn update_one(
        &self,
        condition: Condition,
        modification: Modification,
        order_by: Vec<SortPart>,
    ) -> Result<MutationResult<M>, EngineError>;

    async fn update_one_ignoring_result(
        &self,
        condition: Condition,
        modification: Modification,
        order_by: Vec<SortPart>,
    ) -> Result<(), EngineError> {
        self.update_one(condition, modification, order_by).await?;
        Ok(())
    }

    async fn update_many(
        &self,
        condition: Condition,
        modification: Modification,
    ) -> Result<u64, EngineError>;

    async fn update_many_ignoring_result(
        &self,
        condition: Condition,
        modification: Modification,
    ) -> Result<(), EngineError> {
        self.update_many(condition, modification).await?;
        Ok(())
    }

    async fn delete_one(
        &self,
        condition: Condition,
        order_by: Vec<SortPart>,
    ) -> Result<Option<M>, EngineError>;

    async fn delete_one_ignoring_old(
        &self,
        condition: Condition,
        order_by: Vec<SortPart>,
    ) -> Result<(), EngineError> {
        self.delete_one(condition, order_by).await?;
        Ok(())
    }

    async fn delete_many(&self, condition: Condition) -> Result<u64, EngineError>;

    async fn delete_many_ignoring_old(&self, condition: Condition) -> Result<(), EngineError> {
        self.delete_many(condition).await?;
        Ok(())
    }

    async fn find(
        &self,
        condition: Condition,
        order_by: Vec<SortPart>,
        limit: Option<usize>,
    ) -> Result<Vec<M>, EngineError>;

    async fn find_partial(
        &self,
        condition: Condition,
        fields: Vec<DataClassPath>,
        order_by: Vec<SortPart>,
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, EngineError>;

    async fn count(&self, condition: Condition) -> Result<u64, EngineError>;

    async fn group_count(
        &self,
        condition: Condition,
        group_by: DataClassPath,
    ) -> Result<HashMap<String, u64>, EngineError>;

    async fn aggregate(
        &self,
        condition: Condition,
        field: DataClassPath,
        op: AggregateOp,
    ) -> Result<Option<Value>, EngineError>;

    async fn group_aggregate(
        &self,
        condition: Condition,
        group_by: DataClassPath,
        field: DataClassPath,
        op: AggregateOp,
    ) -> Result<HashMap<String, Value>, EngineError>;

    /// Dense-vector similarity search. Engines without vector support
    /// inherit the default and fail with a typed `Unsupported` error rather
    /// than emulating it (spec §4.2: "the facade does not emulate across
    /// engines").
    async fn find_similar(
        &self,
        _vector: Vec<f32>,
        _limit: usize,
    ) -> Result<Vec<M>, EngineError> {
        Err(EngineError::unsupported("table", "find_similar"))
    }

    async fn find_similar_sparse(
        &self,
        _indices: Vec<u32>,
        _values: Vec<f32>,
        _limit: usize,
    ) -> Result<Vec<M>, EngineError> {
        Err(EngineError::unsupported("table", "find_similar_sparse"))
    }
}
