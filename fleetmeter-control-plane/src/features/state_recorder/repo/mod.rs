use crate::shared::error::{lock_poisoned, ControlPlaneResult};
use crate::shared::types::StatusEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Merge step run under the store's write lock. Receives the current row,
/// returns the row to store or `None` to leave it as is.
pub type MergeFn<'a> = &'a (dyn Fn(Option<&StatusEntry>) -> Option<StatusEntry> + Send + Sync);

/// Repository trait for the metering table
#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// Store a row, replacing any previous one for the task
    async fn put(&self, entry: StatusEntry) -> ControlPlaneResult<()>;

    /// Retrieve the row of a task
    async fn get(&self, task_id: &str) -> ControlPlaneResult<Option<StatusEntry>>;

    /// Read-modify-write of one row. Returns the stored row when it changed.
    async fn upsert(
        &self,
        task_id: &str,
        merge: MergeFn<'_>,
    ) -> ControlPlaneResult<Option<StatusEntry>>;

    /// All rows, ordered by task id
    async fn list(&self) -> ControlPlaneResult<Vec<StatusEntry>>;
}

/// In-memory implementation of the metering table
#[derive(Clone, Default)]
pub struct InMemoryStatusRepository {
    storage: Arc<RwLock<HashMap<String, StatusEntry>>>,
}

impl InMemoryStatusRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusRepository for InMemoryStatusRepository {
    async fn put(&self, entry: StatusEntry) -> ControlPlaneResult<()> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        storage.insert(entry.task_id.clone(), entry);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> ControlPlaneResult<Option<StatusEntry>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(storage.get(task_id).cloned())
    }

    async fn upsert(
        &self,
        task_id: &str,
        merge: MergeFn<'_>,
    ) -> ControlPlaneResult<Option<StatusEntry>> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        let Some(entry) = merge(storage.get(task_id)) else {
            return Ok(None);
        };
        storage.insert(task_id.to_string(), entry.clone());
        Ok(Some(entry))
    }

    async fn list(&self) -> ControlPlaneResult<Vec<StatusEntry>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        let mut entries: Vec<StatusEntry> = storage.values().cloned().collect();
        entries.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(entries)
    }
}
