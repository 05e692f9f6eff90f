//! Mock implementations of the collaborator traits
//!
//! In-memory doubles that can be scripted per test without real
//! sandbox nodes or a database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleet_core::models::{SandboxStatus, Submission, Task, TaskCounts, TaskStatus, Worker, WorkerStatus};
use fleet_core::{FleetError, FleetResult, FleetStore, SandboxClient};
use uuid::Uuid;

/// Mock implementation of FleetStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockFleetStore {
    workers: Arc<Mutex<HashMap<String, Worker>>>,
    tasks: Arc<Mutex<HashMap<Uuid, Task>>>,
    status_updates: Arc<Mutex<Vec<(Uuid, TaskStatus)>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockFleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: Vec<Worker>) -> Self {
        let store = Self::new();
        for worker in workers {
            store.insert_worker(worker);
        }
        store
    }

    pub fn insert_worker(&self, worker: Worker) {
        self.workers
            .lock()
            .unwrap()
            .insert(worker.name.clone(), worker);
    }

    pub fn remove_worker(&self, name: &str) {
        self.workers.lock().unwrap().remove(name);
    }

    pub fn insert_task(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    /// 模拟存储故障，之后的所有调用都返回 StoreUnavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn worker(&self, name: &str) -> Option<Worker> {
        self.workers.lock().unwrap().get(name).cloned()
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn status_updates(&self) -> Vec<(Uuid, TaskStatus)> {
        self.status_updates.lock().unwrap().clone()
    }

    fn check_available(&self) -> FleetResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FleetError::StoreUnavailable(
                "mock store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FleetStore for MockFleetStore {
    async fn list_workers(&self) -> FleetResult<Vec<Worker>> {
        self.check_available()?;
        let mut workers: Vec<Worker> = self.workers.lock().unwrap().values().cloned().collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workers)
    }

    async fn get_worker(&self, name: &str) -> FleetResult<Option<Worker>> {
        self.check_available()?;
        Ok(self.worker(name))
    }

    async fn update_worker_status(&self, name: &str, status: WorkerStatus) -> FleetResult<()> {
        self.check_available()?;
        let mut workers = self.workers.lock().unwrap();
        let worker = workers.get_mut(name).ok_or_else(|| FleetError::WorkerNotFound {
            name: name.to_string(),
        })?;
        worker.status = status;
        Ok(())
    }

    async fn create_task(&self, task: &Task) -> FleetResult<()> {
        self.check_available()?;
        self.insert_task(task.clone());
        Ok(())
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> FleetResult<()> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(&id).ok_or(FleetError::TaskNotFound { id })?;
        task.status = status;
        task.updated_at = Utc::now();
        self.status_updates.lock().unwrap().push((id, status));
        Ok(())
    }

    async fn list_pending_tasks(&self) -> FleetResult<Vec<Task>> {
        self.check_available()?;
        Ok(self
            .tasks()
            .into_iter()
            .filter(|t| !t.is_terminal())
            .collect())
    }
}

#[derive(Debug, Default)]
struct SandboxScript {
    pending: HashMap<String, u32>,
    unreachable: HashSet<String>,
    rejecting: HashSet<String>,
    task_statuses: HashMap<(String, u64), String>,
    unreachable_hosts: HashSet<String>,
    next_task_id: u64,
    submissions: Vec<(String, Submission)>,
    status_calls: HashMap<String, u32>,
    task_status_calls: u32,
    status_delay: Option<Duration>,
}

/// Mock implementation of SandboxClient for testing
///
/// 未设置待处理数的Worker默认返回 0。
#[derive(Debug, Clone, Default)]
pub struct MockSandboxClient {
    script: Arc<Mutex<SandboxScript>>,
}

impl MockSandboxClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending(&self, worker: &str, pending: u32) {
        self.script
            .lock()
            .unwrap()
            .pending
            .insert(worker.to_string(), pending);
    }

    /// 状态查询失败
    pub fn set_unreachable(&self, worker: &str, unreachable: bool) {
        let mut script = self.script.lock().unwrap();
        if unreachable {
            script.unreachable.insert(worker.to_string());
        } else {
            script.unreachable.remove(worker);
        }
    }

    /// 文件提交失败
    pub fn set_rejecting(&self, worker: &str, rejecting: bool) {
        let mut script = self.script.lock().unwrap();
        if rejecting {
            script.rejecting.insert(worker.to_string());
        } else {
            script.rejecting.remove(worker);
        }
    }

    pub fn set_task_status(&self, host: &str, remote_task_id: u64, status: &str) {
        self.script
            .lock()
            .unwrap()
            .task_statuses
            .insert((host.to_string(), remote_task_id), status.to_string());
    }

    /// 任务状态查询失败
    pub fn set_host_unreachable(&self, host: &str, unreachable: bool) {
        let mut script = self.script.lock().unwrap();
        if unreachable {
            script.unreachable_hosts.insert(host.to_string());
        } else {
            script.unreachable_hosts.remove(host);
        }
    }

    /// 状态查询在返回前等待的时间
    pub fn set_status_delay(&self, delay: Duration) {
        self.script.lock().unwrap().status_delay = Some(delay);
    }

    /// 按顺序返回 (Worker名称, 提交)
    pub fn submissions(&self) -> Vec<(String, Submission)> {
        self.script.lock().unwrap().submissions.clone()
    }

    pub fn status_calls(&self, worker: &str) -> u32 {
        self.script
            .lock()
            .unwrap()
            .status_calls
            .get(worker)
            .copied()
            .unwrap_or(0)
    }

    pub fn task_status_calls(&self) -> u32 {
        self.script.lock().unwrap().task_status_calls
    }
}

#[async_trait]
impl SandboxClient for MockSandboxClient {
    async fn fetch_status(&self, worker: &Worker) -> FleetResult<SandboxStatus> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            *script.status_calls.entry(worker.name.clone()).or_insert(0) += 1;
            script.status_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.script.lock().unwrap();
        if script.unreachable.contains(&worker.name) {
            return Err(FleetError::unreachable(&worker.name, "connection refused"));
        }

        let pending = script.pending.get(&worker.name).copied().unwrap_or(0);
        Ok(SandboxStatus {
            tasks: TaskCounts {
                total: pending,
                pending,
                ..TaskCounts::default()
            },
            hostname: worker.name.clone(),
            ..SandboxStatus::default()
        })
    }

    async fn submit(&self, worker: &Worker, submission: &Submission) -> FleetResult<u64> {
        let mut script = self.script.lock().unwrap();
        if script.rejecting.contains(&worker.name) {
            return Err(FleetError::forward_failed(&worker.name, "HTTP 500"));
        }

        script.next_task_id += 1;
        let task_id = script.next_task_id;
        script
            .submissions
            .push((worker.name.clone(), submission.clone()));
        Ok(task_id)
    }

    async fn fetch_task_status(&self, host: &str, remote_task_id: u64) -> FleetResult<String> {
        let mut script = self.script.lock().unwrap();
        script.task_status_calls += 1;
        if script.unreachable_hosts.contains(host) {
            return Err(FleetError::unreachable(host, "timed out"));
        }

        Ok(script
            .task_statuses
            .get(&(host.to_string(), remote_task_id))
            .cloned()
            .unwrap_or_else(|| "pending".to_string()))
    }
}
