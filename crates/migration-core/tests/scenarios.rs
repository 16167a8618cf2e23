//! End-to-end scenarios from spec §8, exercised through `MigrationDatabase`
//! wired to two independent `testkit::MemoryDatabase` engines.

use db_api::{Database, Table};
use migration_core::{FnKeyExtractor, InMemoryCheckpointStore, MigrationDatabase, NoopStatusCallback};
use model::{BackfillConfig, Condition, DataClassPath, Phase, RetryConfig, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use testkit::MemoryDatabase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    id: i64,
    name: String,
}

fn id_extractor() -> FnKeyExtractor<Person, impl Fn(&Person) -> Option<Value>> {
    FnKeyExtractor::new(|p: &Person| Some(Value::Int(p.id)))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn source_only_write_isolation() {
    let source = Arc::new(MemoryDatabase::new("source", "id"));
    let target = Arc::new(MemoryDatabase::new("target", "id"));
    let db = MigrationDatabase::new(source.clone(), target.clone(), Phase::SourceOnly, RetryConfig::default());

    let people = db.table::<Person>("people").await;
    people.insert(vec![Person { id: 1, name: "Alice".into() }]).await.unwrap();

    let source_table = source.table::<Person>("people");
    let target_table = target.table::<Person>("people");
    assert_eq!(source_table.count(Condition::Always).await.unwrap(), 1);
    assert_eq!(target_table.count(Condition::Always).await.unwrap(), 0);

    let found = people.find(Condition::Always, vec![], None).await.unwrap();
    assert_eq!(found, vec![Person { id: 1, name: "Alice".into() }]);
}

#[tokio::test]
async fn dual_write_propagates() {
    let source = Arc::new(MemoryDatabase::new("source", "id"));
    let target = Arc::new(MemoryDatabase::new("target", "id"));
    let db = MigrationDatabase::new(
        source.clone(),
        target.clone(),
        Phase::DualWriteReadSource,
        RetryConfig::default(),
    );

    let people = db.table::<Person>("people").await;
    people.insert(vec![Person { id: 1, name: "Alice".into() }]).await.unwrap();
    settle().await;

    let source_table = source.table::<Person>("people");
    let target_table = target.table::<Person>("people");
    assert_eq!(source_table.count(Condition::Always).await.unwrap(), 1);
    assert_eq!(target_table.count(Condition::Always).await.unwrap(), 1);

    people
        .replace_one(
            Condition::equals(DataClassPath::new("id"), Value::Int(1)),
            Person { id: 1, name: "Alice2".into() },
            vec![],
        )
        .await
        .unwrap();
    settle().await;

    for table in [&source_table, &target_table] {
        let rows = table.find(Condition::Always, vec![], None).await.unwrap();
        assert_eq!(rows, vec![Person { id: 1, name: "Alice2".into() }]);
    }
}

#[tokio::test]
async fn read_source_vs_read_target() {
    let source = Arc::new(MemoryDatabase::new("source", "id"));
    let target = Arc::new(MemoryDatabase::new("target", "id"));

    source
        .table::<Person>("people")
        .insert(vec![Person { id: 1, name: "Alice".into() }])
        .await
        .unwrap();
    target
        .table::<Person>("people")
        .insert(vec![Person { id: 1, name: "Alice-Target".into() }])
        .await
        .unwrap();

    let db = MigrationDatabase::new(
        source.clone(),
        target.clone(),
        Phase::DualWriteReadSource,
        RetryConfig::default(),
    );
    let people = db.table::<Person>("people").await;

    let rows = people.find(Condition::Always, vec![], None).await.unwrap();
    assert_eq!(rows, vec![Person { id: 1, name: "Alice".into() }]);

    db.phase_registry().set_default(Phase::DualWriteReadTarget);
    let rows = people.find(Condition::Always, vec![], None).await.unwrap();
    assert_eq!(rows, vec![Person { id: 1, name: "Alice-Target".into() }]);
}

#[tokio::test]
async fn end_to_end_cutover() {
    let source = Arc::new(MemoryDatabase::new("source", "id"));
    let target = Arc::new(MemoryDatabase::new("target", "id"));
    let db = MigrationDatabase::new(source.clone(), target.clone(), Phase::SourceOnly, RetryConfig::default());

    let people = db.table::<Person>("people").await;
    let initial: Vec<Person> = (0..20).map(|i| Person { id: i, name: format!("person-{i}") }).collect();
    people.insert(initial).await.unwrap();

    db.phase_registry().set_default(Phase::DualWriteReadSource);
    people.insert(vec![Person { id: 20, name: "person-20".into() }]).await.unwrap();
    settle().await;

    let source_table = source.table::<Person>("people");
    let target_table = target.table::<Person>("people");
    assert_eq!(source_table.count(Condition::Always).await.unwrap(), 21);
    assert_eq!(target_table.count(Condition::Always).await.unwrap(), 1);

    let job = db
        .start_backfill::<Person, _>(
            "people",
            DataClassPath::new("id"),
            id_extractor(),
            BackfillConfig::default(),
            Arc::new(InMemoryCheckpointStore::default()),
            Arc::new(NoopStatusCallback),
        )
        .await
        .unwrap();
    let status = job.await_completion().await;
    assert_eq!(status.processed_count, 21);
    assert_eq!(target_table.count(Condition::Always).await.unwrap(), 21);

    let verification = db
        .verify_sync::<Person, _>("people", DataClassPath::new("id"), id_extractor(), 25)
        .await
        .unwrap();
    assert!(verification.in_sync());

    db.phase_registry().set_default(Phase::DualWriteReadTarget);
    let rows = people.find(Condition::equals(DataClassPath::new("id"), Value::Int(20)), vec![], None).await.unwrap();
    assert_eq!(rows, vec![Person { id: 20, name: "person-20".into() }]);

    db.phase_registry().set_default(Phase::TargetOnly);
    people.insert(vec![Person { id: 21, name: "person-21".into() }]).await.unwrap();
    settle().await;

    assert_eq!(source_table.count(Condition::Always).await.unwrap(), 21);
    assert_eq!(target_table.count(Condition::Always).await.unwrap(), 22);
}
