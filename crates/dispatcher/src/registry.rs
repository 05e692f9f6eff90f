//! Fleet registry: the shared view of worker state.
//!
//! The registry owns the only mutable copy of the fleet snapshot. Readers get
//! an `Arc<FleetSnapshot>` that never changes underneath them; writers build a
//! new snapshot under the write lock and swap it in, so a dispatch never
//! observes a half-updated worker.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_core::models::{FleetSnapshot, Worker, WorkerStatus};
use fleet_core::{FleetEvent, FleetResult, FleetStore};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub struct FleetRegistry {
    store: Arc<dyn FleetStore>,
    snapshot: RwLock<Arc<FleetSnapshot>>,
    /// 每个Worker的连续失败次数
    failures: Mutex<HashMap<String, u32>>,
    failure_threshold: u32,
    events: broadcast::Sender<FleetEvent>,
}

impl FleetRegistry {
    pub fn new(
        store: Arc<dyn FleetStore>,
        failure_threshold: u32,
        events: broadcast::Sender<FleetEvent>,
    ) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(FleetSnapshot::default())),
            failures: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
            events,
        }
    }

    /// 从存储读取Worker清单，存储不可达时返回 StoreUnavailable
    pub async fn list_workers(&self) -> FleetResult<Vec<Worker>> {
        self.store.list_workers().await
    }

    /// 当前快照，可能落后于最新状态一个轮询周期
    pub async fn snapshot(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// 用存储中的清单刷新快照，保留已有的观测数据
    ///
    /// 存储中的 `inactive` 始终生效；其余情况下 active/unknown 由健康检查维护。
    pub async fn refresh(&self) -> FleetResult<usize> {
        let stored = self.store.list_workers().await?;

        let mut guard = self.snapshot.write().await;
        let current = Arc::clone(&*guard);
        let merged: Vec<Worker> = stored
            .into_iter()
            .map(|mut worker| {
                if let Some(known) = current.get(&worker.name) {
                    worker.pending_count = known.pending_count;
                    worker.observed_at = known.observed_at;
                    if worker.status != WorkerStatus::Inactive
                        && known.status != WorkerStatus::Inactive
                    {
                        worker.status = known.status;
                    }
                }
                worker
            })
            .collect();

        let count = merged.len();
        *guard = Arc::new(FleetSnapshot::new(merged));
        drop(guard);

        let snapshot = self.snapshot().await;
        self.failures
            .lock()
            .await
            .retain(|name, _| snapshot.get(name).is_some());

        debug!("Worker清单已刷新，共 {} 个Worker", count);
        Ok(count)
    }

    /// 记录一次观测，按观测时间后写入者胜出
    ///
    /// 返回 false 表示Worker不存在或观测早于已有记录。
    pub async fn update_observation(
        &self,
        name: &str,
        pending_count: u32,
        observed_at: DateTime<Utc>,
    ) -> bool {
        let mut guard = self.snapshot.write().await;
        let Some(worker) = guard.get(name) else {
            return false;
        };
        if worker.observed_at.is_some_and(|last| last > observed_at) {
            debug!("忽略Worker {} 的过期观测", name);
            return false;
        }

        let updated = guard.with_changes(|workers| {
            if let Some(worker) = workers.get_mut(name) {
                worker.pending_count = pending_count;
                worker.observed_at = Some(observed_at);
            }
        });
        *guard = Arc::new(updated);
        true
    }

    /// 记录一次成功的健康检查：更新观测、清零失败计数，必要时恢复为 active
    pub async fn record_success(
        &self,
        name: &str,
        pending_count: u32,
        observed_at: DateTime<Utc>,
    ) -> Option<WorkerStatus> {
        self.failures.lock().await.remove(name);

        if !self.update_observation(name, pending_count, observed_at).await {
            return None;
        }

        let current = self.snapshot().await.get(name).map(|w| w.status);
        if current == Some(WorkerStatus::Unknown) {
            info!("Worker {} 恢复响应，重新标记为 active", name);
            self.set_status(name, WorkerStatus::Active).await;
            return Some(WorkerStatus::Active);
        }
        None
    }

    /// 记录一次失败，连续失败达到阈值时将 active 的Worker标记为 unknown
    pub async fn record_failure(&self, name: &str) -> Option<WorkerStatus> {
        let count = {
            let mut failures = self.failures.lock().await;
            let count = failures.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let current = self.snapshot().await.get(name).map(|w| w.status);
        if count >= self.failure_threshold && current == Some(WorkerStatus::Active) {
            warn!(
                "Worker {} 连续 {} 次无响应，标记为 unknown",
                name, count
            );
            self.set_status(name, WorkerStatus::Unknown).await;
            return Some(WorkerStatus::Unknown);
        }

        debug!("Worker {} 连续失败 {} 次", name, count);
        None
    }

    pub async fn consecutive_failures(&self, name: &str) -> u32 {
        self.failures.lock().await.get(name).copied().unwrap_or(0)
    }

    /// 修改Worker状态并写回存储，存储失败只记录日志
    pub async fn set_status(&self, name: &str, status: WorkerStatus) -> bool {
        let previous = {
            let mut guard = self.snapshot.write().await;
            let Some(previous) = guard.get(name).map(|w| w.status) else {
                return false;
            };
            if previous == status {
                return false;
            }
            let updated = guard.with_changes(|workers| {
                if let Some(worker) = workers.get_mut(name) {
                    worker.status = status;
                }
            });
            *guard = Arc::new(updated);
            previous
        };

        if let Err(e) = self.store.update_worker_status(name, status).await {
            error!("持久化Worker {} 状态 {} 失败: {}", name, status, e);
        }

        let _ = self.events.send(FleetEvent::WorkerStatusChanged {
            worker: name.to_string(),
            from: previous,
            to: status,
        });
        true
    }

    /// 转发成功后先行累加待处理数，直到下一次健康检查覆盖
    pub async fn note_assignment(&self, name: &str) {
        let mut guard = self.snapshot.write().await;
        if guard.get(name).is_none() {
            return;
        }
        let updated = guard.with_changes(|workers| {
            if let Some(worker) = workers.get_mut(name) {
                worker.pending_count = worker.pending_count.saturating_add(1);
            }
        });
        *guard = Arc::new(updated);
    }
}
