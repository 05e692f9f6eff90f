//! 内存中的集群存储
//!
//! 持久化层不属于协调核心，这里提供一个以配置清单为初始数据的内存实现，
//! 供单机部署和测试使用。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use fleet_core::config::FleetConfig;
use fleet_core::models::{Task, TaskStatus, Worker, WorkerStatus};
use fleet_core::{FleetError, FleetResult, FleetStore};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryFleetStore {
    workers: RwLock<HashMap<String, Worker>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryFleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: impl IntoIterator<Item = Worker>) -> Self {
        Self {
            workers: RwLock::new(workers.into_iter().map(|w| (w.name.clone(), w)).collect()),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::with_workers(config.workers.iter().map(Worker::from))
    }

    /// 注册Worker，同名时覆盖
    pub async fn register_worker(&self, worker: Worker) {
        self.workers.write().await.insert(worker.name.clone(), worker);
    }

    pub async fn remove_worker(&self, name: &str) -> Option<Worker> {
        self.workers.write().await.remove(name)
    }

    pub async fn all_tasks(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl FleetStore for InMemoryFleetStore {
    async fn list_workers(&self) -> FleetResult<Vec<Worker>> {
        let mut workers: Vec<Worker> = self.workers.read().await.values().cloned().collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workers)
    }

    async fn get_worker(&self, name: &str) -> FleetResult<Option<Worker>> {
        Ok(self.workers.read().await.get(name).cloned())
    }

    async fn update_worker_status(&self, name: &str, status: WorkerStatus) -> FleetResult<()> {
        let mut workers = self.workers.write().await;
        let worker = workers.get_mut(name).ok_or_else(|| FleetError::WorkerNotFound {
            name: name.to_string(),
        })?;
        worker.status = status;
        Ok(())
    }

    async fn create_task(&self, task: &Task) -> FleetResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> FleetResult<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or(FleetError::TaskNotFound { id })?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pending_tasks(&self) -> FleetResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| !t.is_terminal())
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::config::WorkerSeed;
    use fleet_core::models::Submission;

    #[tokio::test]
    async fn test_seeded_from_config() {
        let config = FleetConfig {
            workers: vec![
                WorkerSeed {
                    name: "cuckoo-02".to_string(),
                    host: "10.0.0.12".to_string(),
                    status: WorkerStatus::Inactive,
                },
                WorkerSeed {
                    name: "cuckoo-01".to_string(),
                    host: "10.0.0.11".to_string(),
                    status: WorkerStatus::Active,
                },
            ],
        };

        let store = InMemoryFleetStore::from_config(&config);
        let workers = store.list_workers().await.unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].name, "cuckoo-01");
        assert_eq!(workers[1].status, WorkerStatus::Inactive);
    }

    #[tokio::test]
    async fn test_update_unknown_worker_fails() {
        let store = InMemoryFleetStore::new();
        let result = store
            .update_worker_status("ghost", WorkerStatus::Active)
            .await;
        assert!(matches!(result, Err(FleetError::WorkerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_pending_tasks_exclude_terminal() {
        let store = InMemoryFleetStore::new();
        let submission = Submission::new("a.exe", "/tmp/a.exe", "aa");
        let first = Task::accepted(&submission, "cuckoo-01", "10.0.0.11", 1);
        let second = Task::accepted(&submission, "cuckoo-01", "10.0.0.11", 2);
        store.create_task(&first).await.unwrap();
        store.create_task(&second).await.unwrap();

        store
            .update_task_status(second.id, TaskStatus::Reported)
            .await
            .unwrap();

        let pending = store.list_pending_tasks().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }
}
