use crate::{error::EngineError, table::Table, table::TableModel};
use async_trait::async_trait;
use model::HealthStatus;
use std::{sync::Arc, time::Duration};

/// A wrapped storage engine: something that can hand back typed [`Table`]
/// handles by name and report its own connection lifecycle and health.
///
/// `Database` is consumed generically (`D: Database`), never as `dyn
/// Database` — `table` is a generic method, which keeps per-entity
/// dispatch fully static and avoids a type-erased table cache inside each
/// engine implementation.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Short tag used in error messages and health reports, e.g. `"source"`.
    fn engine_name(&self) -> &'static str;

    fn table<M: TableModel>(&self, name: &str) -> Arc<dyn Table<M>>;

    async fn connect(&self) -> Result<(), EngineError>;

    async fn disconnect(&self) -> Result<(), EngineError>;

    async fn health_check(&self) -> Result<HealthStatus, EngineError>;

    fn health_check_frequency(&self) -> Duration {
        Duration::from_secs(30)
    }
}
