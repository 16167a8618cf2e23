//! In-memory `Database`/`Table` implementation used by `migration-core`'s
//! tests and any integration test that needs two independently addressable
//! storage engines without standing up real databases.

use async_trait::async_trait;
use db_api::{EngineError, MutationResult, Table, TableModel};
use model::{AggregateOp, Condition, DataClassPath, HealthStatus, Modification, SortPart, Value};
use std::{
    any::{Any, TypeId},
    cmp::Ordering as CmpOrdering,
    collections::HashMap,
    sync::{Arc, Mutex},
};

fn json_field<'a>(row: &'a serde_json::Value, path: &DataClassPath) -> Option<&'a serde_json::Value> {
    let mut current = row;
    for segment in path.as_str().split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn to_model_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) if n.is_i64() => Value::Int(n.as_i64().unwrap()),
        serde_json::Value::Number(n) => Value::Float(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::Json(other.clone()),
    }
}

fn compare(field: &serde_json::Value, value: &Value) -> Option<CmpOrdering> {
    to_model_value(field).partial_cmp(value)
}

fn eval(condition: &Condition, row: &serde_json::Value) -> bool {
    match condition {
        Condition::Always => true,
        Condition::Never => false,
        Condition::Equals(path, value) => json_field(row, path)
            .map(|f| &to_model_value(f) == value)
            .unwrap_or(false),
        Condition::NotEquals(path, value) => json_field(row, path)
            .map(|f| &to_model_value(f) != value)
            .unwrap_or(true),
        Condition::GreaterThan(path, value) => json_field(row, path)
            .and_then(|f| compare(f, value))
            .is_some_and(|o| o == CmpOrdering::Greater),
        Condition::GreaterThanOrEqual(path, value) => json_field(row, path)
            .and_then(|f| compare(f, value))
            .is_some_and(|o| o != CmpOrdering::Less),
        Condition::LessThan(path, value) => json_field(row, path)
            .and_then(|f| compare(f, value))
            .is_some_and(|o| o == CmpOrdering::Less),
        Condition::And(parts) => parts.iter().all(|c| eval(c, row)),
        Condition::Or(parts) => parts.iter().any(|c| eval(c, row)),
    }
}

fn apply_modification(modification: &Modification, row: &mut serde_json::Value) {
    match modification {
        Modification::Assign(value) => *row = value.clone(),
        Modification::Set(path, value) => set_field(row, path, to_json_value(value)),
        Modification::Increment(path, delta) => {
            let current = json_field(row, path).and_then(|v| v.as_f64()).unwrap_or(0.0);
            set_field(
                row,
                path,
                serde_json::Number::from_f64(current + delta)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            );
        }
        Modification::Combine(parts) => {
            for part in parts {
                apply_modification(part, row);
            }
        }
    }
}

fn to_json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::String(s) => serde_json::json!(s),
        Value::Boolean(b) => serde_json::json!(b),
        Value::Json(j) => j.clone(),
        Value::Bytes(b) => serde_json::json!(b),
        Value::Timestamp(t) => serde_json::json!(t.to_rfc3339()),
        Value::Null => serde_json::Value::Null,
    }
}

fn set_field(row: &mut serde_json::Value, path: &DataClassPath, value: serde_json::Value) {
    let segments: Vec<&str> = path.as_str().split('.').collect();
    let mut current = row;
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if !current.is_object() {
            *current = serde_json::json!({});
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::json!({}));
    }
    if !current.is_object() {
        *current = serde_json::json!({});
    }
    if let Some(last) = segments.last() {
        current.as_object_mut().unwrap().insert(last.to_string(), value);
    }
}

/// A single entity's in-memory rows, addressed structurally via JSON so the
/// engine can evaluate `Condition`/`Modification` without knowing `M`.
pub struct MemoryTable<M> {
    id_field: String,
    rows: Mutex<Vec<serde_json::Value>>,
    _marker: std::marker::PhantomData<fn() -> M>,
}

impl<M: TableModel> MemoryTable<M> {
    pub fn new(id_field: impl Into<String>) -> Self {
        MemoryTable {
            id_field: id_field.into(),
            rows: Mutex::new(Vec::new()),
            _marker: std::marker::PhantomData,
        }
    }

    fn id_path(&self) -> DataClassPath {
        DataClassPath::new(self.id_field.clone())
    }

    fn to_model(&self, json: &serde_json::Value) -> M {
        serde_json::from_value(json.clone()).expect("stored row no longer deserializes as M")
    }
}

#[async_trait]
impl<M: TableModel> Table<M> for MemoryTable<M> {
    async fn insert(&self, models: Vec<M>) -> Result<Vec<M>, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        for model in &models {
            let json = serde_json::to_value(model)
                .map_err(|e| EngineError::failed("memory", e))?;
            rows.push(json);
        }
        Ok(models)
    }

    async fn replace_one(
        &self,
        condition: Condition,
        model: M,
        order_by: Vec<SortPart>,
    ) -> Result<MutationResult<M>, EngineError> {
        let json = serde_json::to_value(&model).map_err(|e| EngineError::failed("memory", e))?;
        let mut rows = self.rows.lock().unwrap();
        sort_rows(&mut rows, &order_by);
        if let Some(slot) = rows.iter_mut().find(|r| eval(&condition, r)) {
            let before = self.to_model(slot);
            *slot = json;
            Ok(MutationResult {
                before: Some(before),
                after: Some(model),
            })
        } else {
            Ok(MutationResult { before: None, after: None })
        }
    }

    async fn upsert_one(
        &self,
        condition: Condition,
        modification: Modification,
        model: M,
    ) -> Result<Option<M>, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(slot) = rows.iter_mut().find(|r| eval(&condition, r)) {
            apply_modification(&modification, slot);
            Ok(Some(self.to_model(slot)))
        } else {
            let json = serde_json::to_value(&model).map_err(|e| EngineError::failed("memory", e))?;
            rows.push(json);
            Ok(Some(model))
        }
    }

    async fn update_one(
        &self,
        condition: Condition,
        modification: Modification,
        order_by: Vec<SortPart>,
    ) -> Result<MutationResult<M>, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        sort_rows(&mut rows, &order_by);
        if let Some(slot) = rows.iter_mut().find(|r| eval(&condition, r)) {
            let before = self.to_model(slot);
            apply_modification(&modification, slot);
            let after = self.to_model(slot);
            Ok(MutationResult {
                before: Some(before),
                after: Some(after),
            })
        } else {
            Ok(MutationResult { before: None, after: None })
        }
    }

    async fn update_many(&self, condition: Condition, modification: Modification) -> Result<u64, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        let mut count = 0u64;
        for row in rows.iter_mut().filter(|r| eval(&condition, r)) {
            apply_modification(&modification, row);
            count += 1;
        }
        Ok(count)
    }

    async fn delete_one(&self, condition: Condition, order_by: Vec<SortPart>) -> Result<Option<M>, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        sort_rows(&mut rows, &order_by);
        if let Some(pos) = rows.iter().position(|r| eval(&condition, r)) {
            let removed = rows.remove(pos);
            Ok(Some(self.to_model(&removed)))
        } else {
            Ok(None)
        }
    }

    async fn delete_many(&self, condition: Condition) -> Result<u64, EngineError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !eval(&condition, r));
        Ok((before - rows.len()) as u64)
    }

    async fn find(
        &self,
        condition: Condition,
        order_by: Vec<SortPart>,
        limit: Option<usize>,
    ) -> Result<Vec<M>, EngineError> {
        let mut rows = self.rows.lock().unwrap().clone();
        sort_rows(&mut rows, &order_by);
        let mut out: Vec<M> = rows
            .iter()
            .filter(|r| eval(&condition, r))
            .map(|r| self.to_model(r))
            .collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn find_partial(
        &self,
        condition: Condition,
        fields: Vec<DataClassPath>,
        order_by: Vec<SortPart>,
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, EngineError> {
        let mut rows = self.rows.lock().unwrap().clone();
        sort_rows(&mut rows, &order_by);
        let mut out: Vec<serde_json::Value> = rows
            .iter()
            .filter(|r| eval(&condition, r))
            .map(|r| {
                let mut partial = serde_json::Map::new();
                for field in &fields {
                    if let Some(value) = json_field(r, field) {
                        partial.insert(field.as_str().to_string(), value.clone());
                    }
                }
                serde_json::Value::Object(partial)
            })
            .collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn count(&self, condition: Condition) -> Result<u64, EngineError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| eval(&condition, r))
            .count() as u64)
    }

    async fn group_count(
        &self,
        condition: Condition,
        group_by: DataClassPath,
    ) -> Result<HashMap<String, u64>, EngineError> {
        let mut groups = HashMap::new();
        for row in self.rows.lock().unwrap().iter().filter(|r| eval(&condition, r)) {
            let key = json_field(row, &group_by).map(to_model_value).unwrap_or(Value::Null);
            *groups.entry(key.as_str().unwrap_or_default().to_string()).or_insert(0u64) += 1;
        }
        Ok(groups)
    }

    async fn aggregate(
        &self,
        condition: Condition,
        field: DataClassPath,
        op: AggregateOp,
    ) -> Result<Option<Value>, EngineError> {
        let rows = self.rows.lock().unwrap();
        let matching: Vec<f64> = rows
            .iter()
            .filter(|r| eval(&condition, r))
            .filter_map(|r| json_field(r, &field))
            .filter_map(|v| v.as_f64())
            .collect();

        Ok(match op {
            AggregateOp::Count => Some(Value::Int(matching.len() as i64)),
            AggregateOp::Sum => Some(Value::Float(matching.iter().sum())),
            AggregateOp::Avg => {
                if matching.is_empty() {
                    None
                } else {
                    Some(Value::Float(matching.iter().sum::<f64>() / matching.len() as f64))
                }
            }
            AggregateOp::Min => matching.into_iter().fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            }).map(Value::Float),
            AggregateOp::Max => matching.into_iter().fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            }).map(Value::Float),
        })
    }

    async fn group_aggregate(
        &self,
        _condition: Condition,
        _group_by: DataClassPath,
        _field: DataClassPath,
        _op: AggregateOp,
    ) -> Result<HashMap<String, Value>, EngineError> {
        Err(EngineError::unsupported("memory", "group_aggregate"))
    }
}

fn sort_rows(rows: &mut [serde_json::Value], order_by: &[SortPart]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for part in order_by {
            let ordering = json_field(a, &part.path)
                .zip(json_field(b, &part.path))
                .and_then(|(a, b)| to_model_value(a).partial_cmp(&to_model_value(b)))
                .unwrap_or(CmpOrdering::Equal);
            let ordering = if part.ascending { ordering } else { ordering.reverse() };
            if ordering != CmpOrdering::Equal {
                return ordering;
            }
        }
        CmpOrdering::Equal
    });
}

/// In-memory [`db_api::Database`]. Each call to `table::<M>(name)` returns
/// the same handle for the life of the database, keyed by model type and
/// name so two different entities never share a backing store.
pub struct MemoryDatabase {
    name: &'static str,
    id_field: String,
    tables: Mutex<HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>>,
}

impl MemoryDatabase {
    pub fn new(name: &'static str, id_field: impl Into<String>) -> Self {
        MemoryDatabase {
            name,
            id_field: id_field.into(),
            tables: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl db_api::Database for MemoryDatabase {
    fn engine_name(&self) -> &'static str {
        self.name
    }

    fn table<M: TableModel>(&self, name: &str) -> Arc<dyn Table<M>> {
        let key = (TypeId::of::<M>(), name.to_string());
        let mut tables = self.tables.lock().unwrap();
        let entry = tables
            .entry(key)
            .or_insert_with(|| Arc::new(MemoryTable::<M>::new(self.id_field.clone())) as Arc<dyn Any + Send + Sync>);
        let table = entry
            .clone()
            .downcast::<MemoryTable<M>>()
            .expect("type-keyed table cache entry mismatch");
        table as Arc<dyn Table<M>>
    }

    async fn connect(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, EngineError> {
        Ok(HealthStatus::ok(format!("{} reachable", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_api::Database;

    #[tokio::test]
    async fn insert_find_and_filter_round_trip() {
        let db = MemoryDatabase::new("source", "id");
        let table: Arc<dyn Table<serde_json::Value>> = db.table("rows");

        table
            .insert(vec![
                serde_json::json!({"id": 1, "name": "alice"}),
                serde_json::json!({"id": 2, "name": "bob"}),
            ])
            .await
            .unwrap();

        let all = table.find(Condition::Always, vec![], None).await.unwrap();
        assert_eq!(all.len(), 2);

        let matching = table
            .find(
                Condition::equals(DataClassPath::new("name"), Value::String("bob".into())),
                vec![],
                None,
            )
            .await
            .unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0]["id"], 2);
    }

    #[tokio::test]
    async fn upsert_updates_existing_row() {
        let db = MemoryDatabase::new("source", "id");
        let table: Arc<dyn Table<serde_json::Value>> = db.table("rows");

        table.insert(vec![serde_json::json!({"id": 1, "count": 1})]).await.unwrap();
        table
            .upsert_one(
                Condition::equals(DataClassPath::new("id"), Value::Int(1)),
                Modification::Increment(DataClassPath::new("count"), 1.0),
                serde_json::json!({"id": 1, "count": 1}),
            )
            .await
            .unwrap();

        let rows = table.find(Condition::Always, vec![], None).await.unwrap();
        assert_eq!(rows[0]["count"], 2.0);
    }
}
