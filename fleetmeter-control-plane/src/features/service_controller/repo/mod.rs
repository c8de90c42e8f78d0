use crate::shared::error::{lock_poisoned, ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{TaskInstance, TaskStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Repository trait for live task storage
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Store a newly scheduled task
    async fn create(&self, task: TaskInstance) -> ControlPlaneResult<()>;

    /// Retrieve a task by ID
    async fn get(&self, task_id: &str) -> ControlPlaneResult<Option<TaskInstance>>;

    /// Update task status
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> ControlPlaneResult<()>;

    /// Reap a task
    async fn delete(&self, task_id: &str) -> ControlPlaneResult<Option<TaskInstance>>;

    /// Tasks of one service, oldest launch first
    async fn list_by_service(&self, service_name: &str) -> ControlPlaneResult<Vec<TaskInstance>>;

    /// All tasks, oldest launch first
    async fn list(&self) -> ControlPlaneResult<Vec<TaskInstance>>;
}

/// In-memory implementation of task repository
#[derive(Clone, Default)]
pub struct InMemoryTaskRepository {
    storage: Arc<RwLock<HashMap<String, TaskInstance>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_launch_order(mut tasks: Vec<TaskInstance>) -> Vec<TaskInstance> {
    tasks.sort_by_key(|task| task.launch_seq);
    tasks
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: TaskInstance) -> ControlPlaneResult<()> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        storage.insert(task.task_id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> ControlPlaneResult<Option<TaskInstance>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(storage.get(task_id).cloned())
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> ControlPlaneResult<()> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;

        let task = storage
            .get_mut(task_id)
            .ok_or_else(|| ControlPlaneError::TaskNotFound(task_id.to_string()))?;
        match status {
            TaskStatus::Running => task.mark_running(),
            TaskStatus::Stopped => task.mark_stopped(),
            TaskStatus::Pending => task.status = TaskStatus::Pending,
        }
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> ControlPlaneResult<Option<TaskInstance>> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        Ok(storage.remove(task_id))
    }

    async fn list_by_service(&self, service_name: &str) -> ControlPlaneResult<Vec<TaskInstance>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(by_launch_order(
            storage
                .values()
                .filter(|task| task.service_name == service_name)
                .cloned()
                .collect(),
        ))
    }

    async fn list(&self) -> ControlPlaneResult<Vec<TaskInstance>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(by_launch_order(storage.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::{Placement, PoolKind};

    fn create_test_task(service: &str, seq: u64) -> TaskInstance {
        TaskInstance::new(service, Placement::new(PoolKind::Fixed, seq as u32), seq)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryTaskRepository::new();
        let task = create_test_task("fixed-service", 1);
        let id = task.task_id.clone();

        repo.create(task).await.unwrap();

        let retrieved = repo.get(&id).await.unwrap();
        assert_eq!(retrieved.unwrap().task_id, id);
    }

    #[tokio::test]
    async fn test_update_status_stamps_times() {
        let repo = InMemoryTaskRepository::new();
        let task = create_test_task("fixed-service", 1);
        let id = task.task_id.clone();
        repo.create(task).await.unwrap();

        repo.update_status(&id, TaskStatus::Running).await.unwrap();
        let running = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(running.status, TaskStatus::Running);
        assert!(running.started_at.is_some());

        repo.update_status(&id, TaskStatus::Stopped).await.unwrap();
        let stopped = repo.get(&id).await.unwrap().unwrap();
        assert!(stopped.stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_update_status_not_found() {
        let repo = InMemoryTaskRepository::new();
        let result = repo.update_status("nonexistent", TaskStatus::Running).await;
        assert!(matches!(result, Err(ControlPlaneError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_service_is_launch_ordered() {
        let repo = InMemoryTaskRepository::new();
        for seq in [3, 1, 2] {
            repo.create(create_test_task("fixed-service", seq)).await.unwrap();
        }
        repo.create(create_test_task("elastic-service", 4)).await.unwrap();

        let tasks = repo.list_by_service("fixed-service").await.unwrap();
        let seqs: Vec<u64> = tasks.iter().map(|t| t.launch_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(repo.list().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryTaskRepository::new();
        let task = create_test_task("fixed-service", 1);
        let id = task.task_id.clone();
        repo.create(task).await.unwrap();

        assert!(repo.delete(&id).await.unwrap().is_some());
        assert!(repo.delete(&id).await.unwrap().is_none());
        assert!(repo.get(&id).await.unwrap().is_none());
    }
}
