mod backfill;
mod checkpoint;
mod database;
mod error;
mod key;
mod migration_table;
mod phase_registry;
mod settings;
mod verifier;

pub use backfill::{BackfillJob, BackfillStatusCallback, NoopStatusCallback};
pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, SledCheckpointStore};
pub use database::MigrationDatabase;
pub use error::{BackfillJobError, CheckpointError, ConfigurationError};
pub use key::{FnKeyExtractor, KeyExtractor};
pub use migration_table::{run_retry_operation, LoggingExhaustionHandler, MigrationTable, PendingRetry, ReplayProcessor};
pub use phase_registry::PhaseRegistry;
pub use settings::MigrationSettings;
pub use verifier::Verifier;
