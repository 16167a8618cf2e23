//! Operator CLI for driving a [`migration_core::MigrationDatabase`]: mutate
//! phases, kick off and watch backfills, run the verifier, and inspect
//! health/status. Backed by `testkit`'s in-memory engines so the tool is
//! self-contained for demos; a real deployment would construct
//! `MigrationDatabase` over actual source/target connectors instead.

use clap::{Parser, Subcommand};
use db_api::Table;
use migration_core::{FnKeyExtractor, InMemoryCheckpointStore, MigrationDatabase, NoopStatusCallback};
use model::{BackfillConfig, DataClassPath, Phase, RetryConfig, Value};
use std::{str::FromStr, sync::Arc};
use testkit::MemoryDatabase;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "migration-cli", about = "Operate a zero-downtime migration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert a handful of demo rows into the source engine.
    Seed {
        #[arg(long, default_value = "records")]
        table: String,
        #[arg(long, default_value_t = 10)]
        count: i64,
    },
    /// Read or change the migration phase.
    Phase {
        #[command(subcommand)]
        action: PhaseAction,
    },
    /// Start (or resume) a backfill for one entity.
    Backfill {
        #[arg(long, default_value = "records")]
        table: String,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Run a count-plus-sampling sync check.
    Verify {
        #[arg(long, default_value = "records")]
        table: String,
        #[arg(long, default_value_t = 50)]
        sample_size: usize,
    },
    /// Print aggregate health across both engines.
    Health,
}

#[derive(Subcommand)]
enum PhaseAction {
    Get {
        #[arg(long)]
        table: Option<String>,
    },
    Set {
        #[arg(long)]
        table: Option<String>,
        #[arg(long)]
        phase: String,
    },
}

type Db = MigrationDatabase<MemoryDatabase, MemoryDatabase>;

fn id_extractor() -> FnKeyExtractor<serde_json::Value, impl Fn(&serde_json::Value) -> Option<Value>> {
    FnKeyExtractor::new(|record: &serde_json::Value| {
        record.get("id").and_then(|v| v.as_i64()).map(Value::Int)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::warn!("ctrl-c received, requesting cancellation");
        shutdown_signal.cancel();
    });

    let db: Db = MigrationDatabase::new(
        Arc::new(MemoryDatabase::new("source", "id")),
        Arc::new(MemoryDatabase::new("target", "id")),
        Phase::SourceOnly,
        RetryConfig::default(),
    );
    db.connect().await?;

    match cli.command {
        Command::Seed { table, count } => seed(&db, &table, count).await?,
        Command::Phase { action } => phase(&db, action)?,
        Command::Backfill { table, batch_size } => backfill(&db, &table, batch_size, shutdown).await?,
        Command::Verify { table, sample_size } => verify(&db, &table, sample_size).await?,
        Command::Health => health(&db).await?,
    }

    db.disconnect().await?;
    Ok(())
}

async fn seed(db: &Db, table: &str, count: i64) -> anyhow::Result<()> {
    let source_table = db.table::<serde_json::Value>(table).await;
    let rows: Vec<serde_json::Value> = (0..count)
        .map(|i| serde_json::json!({ "id": i, "name": format!("row-{i}") }))
        .collect();
    source_table.insert(rows).await?;
    println!("seeded {count} rows into '{table}'");
    Ok(())
}

fn phase(db: &Db, action: PhaseAction) -> anyhow::Result<()> {
    match action {
        PhaseAction::Get { table } => {
            let phase = match &table {
                Some(name) => db.phase_registry().phase_for(name),
                None => db.phase_registry().default_phase(),
            };
            println!("{}", phase.as_str());
        }
        PhaseAction::Set { table, phase } => {
            let phase = Phase::from_str(&phase)?;
            match &table {
                Some(name) => db.phase_registry().set_table_override(name, phase),
                None => db.phase_registry().set_default(phase),
            }
            println!("phase set to {}", phase.as_str());
        }
    }
    Ok(())
}

async fn backfill(db: &Db, table: &str, batch_size: usize, shutdown: CancellationToken) -> anyhow::Result<()> {
    let job = db
        .start_backfill(
            table,
            DataClassPath::new("id"),
            id_extractor(),
            BackfillConfig { batch_size, ..Default::default() },
            Arc::new(InMemoryCheckpointStore::default()),
            Arc::new(NoopStatusCallback),
        )
        .await?;

    tokio::select! {
        status = job.await_completion() => {
            println!("backfill finished: {:?}", status.state);
            println!("processed {} rows, {} errors", status.processed_count, status.error_count);
        }
        _ = shutdown.cancelled() => {
            job.pause();
            println!("backfill paused, checkpoint preserved");
        }
    }
    Ok(())
}

async fn verify(db: &Db, table: &str, sample_size: usize) -> anyhow::Result<()> {
    let result = db
        .verify_sync::<serde_json::Value, _>(table, DataClassPath::new("id"), id_extractor(), sample_size)
        .await?;

    println!(
        "source={} target={} sampled={} matching={} missing={} different={} in_sync={}",
        result.source_count,
        result.target_count,
        result.sampled_records,
        result.matching_records,
        result.missing_in_target,
        result.different_in_target,
        result.in_sync(),
    );
    Ok(())
}

async fn health(db: &Db) -> anyhow::Result<()> {
    let status = db.health_check().await?;
    println!("{:?}: {}", status.level, status.message);
    Ok(())
}
