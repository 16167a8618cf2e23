use crate::key::KeyExtractor;
use chrono::Utc;
use db_api::{EngineError, Table, TableModel};
use model::{Condition, DataClassPath, SyncVerificationResult};
use std::sync::Arc;
use tracing::info;

/// Count-plus-sampling sync check between the source and target engines for
/// one entity (spec §4.4). Never mutates either engine.
pub struct Verifier<M: TableModel, K: KeyExtractor<M>> {
    table_name: String,
    source: Arc<dyn Table<M>>,
    target: Arc<dyn Table<M>>,
    id_path: DataClassPath,
    key_extractor: K,
}

impl<M: TableModel, K: KeyExtractor<M>> Verifier<M, K> {
    pub fn new(
        table_name: impl Into<String>,
        source: Arc<dyn Table<M>>,
        target: Arc<dyn Table<M>>,
        id_path: DataClassPath,
        key_extractor: K,
    ) -> Self {
        Verifier {
            table_name: table_name.into(),
            source,
            target,
            id_path,
            key_extractor,
        }
    }

    /// Compares total row counts, then draws up to `sample_size` rows from
    /// the source (in whatever order the engine returns — spec §4.4 notes
    /// no explicit ordering is required) and checks each against the
    /// target by id.
    pub async fn verify_sync(&self, sample_size: usize) -> Result<SyncVerificationResult, EngineError> {
        let source_count = self.source.count(Condition::Always).await?;
        let target_count = self.target.count(Condition::Always).await?;

        let sample = self
            .source
            .find(Condition::Always, vec![], Some(sample_size))
            .await?;

        let mut sampled_records = 0usize;
        let mut matching_records = 0usize;
        let mut missing_in_target = 0usize;
        let mut different_in_target = 0usize;

        for row in &sample {
            let Some(id) = self.key_extractor.extract(row) else {
                continue;
            };
            sampled_records += 1;

            let found = self
                .target
                .find(Condition::equals(self.id_path.clone(), id.clone()), vec![], Some(1))
                .await?;

            match found.into_iter().next() {
                None => missing_in_target += 1,
                Some(target_row) => {
                    if records_equal(row, &target_row) {
                        matching_records += 1;
                    } else {
                        different_in_target += 1;
                    }
                }
            }
        }

        let result = SyncVerificationResult {
            table_name: self.table_name.clone(),
            source_count,
            target_count,
            sampled_records,
            matching_records,
            missing_in_target,
            different_in_target,
            verified_at: Utc::now(),
        };

        info!(
            table = %self.table_name,
            source_count,
            target_count,
            sampled_records,
            matching_records,
            missing_in_target,
            different_in_target,
            "sync verification complete"
        );

        Ok(result)
    }
}

/// Structural equality via each record's serialized JSON form — the core
/// never knows `M`'s field layout, only that it round-trips through serde.
fn records_equal<M: serde::Serialize>(a: &M, b: &M) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::FnKeyExtractor;
    use async_trait::async_trait;
    use db_api::MutationResult;
    use model::{AggregateOp, Modification, SortPart, Value};
    use std::collections::HashMap;

    #[derive(Clone, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Row {
        id: i64,
        name: String,
    }

    struct FixedTable {
        rows: Vec<Row>,
    }

    #[async_trait]
    impl Table<Row> for FixedTable {
        async fn insert(&self, models: Vec<Row>) -> Result<Vec<Row>, EngineError> {
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
            _c: Condition,
            _m: Modification,
            model: Row,
        ) -> Result<Option<Row>, EngineError> {
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
            let mut out: Vec<Row> = match condition {
                Condition::Equals(_, Value::Int(id)) => {
                    self.rows.iter().filter(|r| r.id == id).cloned().collect()
                }
                _ => self.rows.clone(),
            };
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
            Ok(self.rows.len() as u64)
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
    async fn detects_missing_and_divergent_rows() {
        let source = Arc::new(FixedTable {
            rows: vec![
                Row { id: 1, name: "a".into() },
                Row { id: 2, name: "b".into() },
                Row { id: 3, name: "c".into() },
            ],
        });
        let target = Arc::new(FixedTable {
            rows: vec![
                Row { id: 1, name: "a".into() },
                Row { id: 2, name: "WRONG".into() },
            ],
        });

        let verifier = Verifier::new(
            "rows",
            source as Arc<dyn Table<Row>>,
            target as Arc<dyn Table<Row>>,
            DataClassPath::new("id"),
            FnKeyExtractor::new(|r: &Row| Some(Value::Int(r.id))),
        );

        let result = verifier.verify_sync(10).await.unwrap();
        assert_eq!(result.sampled_records, 3);
        assert_eq!(result.matching_records, 1);
        assert_eq!(result.different_in_target, 1);
        assert_eq!(result.missing_in_target, 1);
        assert!(!result.in_sync());
    }
}
