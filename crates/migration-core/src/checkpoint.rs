use crate::error::CheckpointError;
use async_trait::async_trait;
use std::{collections::HashMap, path::Path, sync::RwLock};

/// Durable home for a backfill's last-processed-key checkpoint.
///
/// Spec §6 does not mandate persistence — the status map and the status
/// callback are the integration seam a hosting service is expected to use
/// — but a store that survives process restarts is cheap ambient
/// infrastructure to carry forward, grounded on the teacher's
/// `state::sled_store::SledStateStore`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, table_name: &str, last_processed_id: &str) -> Result<(), CheckpointError>;
    async fn load(&self, table_name: &str) -> Result<Option<String>, CheckpointError>;
}

/// Default, process-lifetime-only store. Sufficient for a single run;
/// callers that need cross-restart resume should supply [`SledCheckpointStore`].
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, table_name: &str, last_processed_id: &str) -> Result<(), CheckpointError> {
        self.checkpoints
            .write()
            .unwrap()
            .insert(table_name.to_string(), last_processed_id.to_string());
        Ok(())
    }

    async fn load(&self, table_name: &str) -> Result<Option<String>, CheckpointError> {
        Ok(self.checkpoints.read().unwrap().get(table_name).cloned())
    }
}

/// Sled-backed checkpoint store, for deployments that want backfill resume
/// to survive a process restart.
pub struct SledCheckpointStore {
    db: sled::Db,
}

impl SledCheckpointStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(SledCheckpointStore { db })
    }

    fn key(table_name: &str) -> String {
        format!("backfill-checkpoint:{table_name}")
    }
}

#[async_trait]
impl CheckpointStore for SledCheckpointStore {
    async fn save(&self, table_name: &str, last_processed_id: &str) -> Result<(), CheckpointError> {
        let encoded = bincode::serialize(last_processed_id)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        self.db
            .insert(Self::key(table_name), encoded)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, table_name: &str) -> Result<Option<String>, CheckpointError> {
        let bytes = self
            .db
            .get(Self::key(table_name))
            .map_err(|e| CheckpointError::Load(e.to_string()))?;
        match bytes {
            Some(ivec) => bincode::deserialize::<String>(&ivec)
                .map(Some)
                .map_err(|e| CheckpointError::Load(e.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips() {
        let store = InMemoryCheckpointStore::default();
        assert_eq!(store.load("users").await.unwrap(), None);
        store.save("users", "42").await.unwrap();
        assert_eq!(store.load("users").await.unwrap(), Some("42".to_string()));
    }

    #[tokio::test]
    async fn sled_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledCheckpointStore::open(dir.path()).unwrap();
        store.save("users", "\"7\"").await.unwrap();
        assert_eq!(
            store.load("users").await.unwrap(),
            Some("\"7\"".to_string())
        );
    }
}
