use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use fleet_core::config::models::TaskTrackerConfig;
use fleet_core::models::{Task, TaskStatus};
use fleet_core::{FleetError, FleetEvent, FleetResult, FleetStore, SandboxClient};
use fleet_infrastructure::FleetMetrics;
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 一轮任务状态轮询的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerTickReport {
    pub polled: usize,
    pub changed: usize,
    pub failed: usize,
    /// 连续查询失败达到阈值后被标记为 error 的任务
    pub errored: usize,
}

enum PollResult {
    Unchanged,
    Changed,
    Failed,
    Errored,
}

/// 轮询远端沙箱，把未结束任务的状态同步到存储
///
/// 同一主机上的任务按顺序查询，不同主机之间并发。
pub struct TaskStatusTracker {
    store: Arc<dyn FleetStore>,
    client: Arc<dyn SandboxClient>,
    metrics: Arc<FleetMetrics>,
    events: broadcast::Sender<FleetEvent>,
    config: TaskTrackerConfig,
    request_timeout: Duration,
    failures: Mutex<HashMap<Uuid, u32>>,
}

impl TaskStatusTracker {
    pub fn new(
        store: Arc<dyn FleetStore>,
        client: Arc<dyn SandboxClient>,
        metrics: Arc<FleetMetrics>,
        events: broadcast::Sender<FleetEvent>,
        config: TaskTrackerConfig,
    ) -> Self {
        let request_timeout = Duration::from_secs(config.poll_interval_seconds);
        Self {
            store,
            client,
            metrics,
            events,
            config,
            request_timeout,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 执行一轮轮询
    ///
    /// 存储不可用时返回错误，本轮不做任何修改。
    pub async fn poll_once(&self) -> FleetResult<TrackerTickReport> {
        let tasks = self.store.list_pending_tasks().await?;

        {
            let live: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
            self.failures.lock().await.retain(|id, _| live.contains(id));
        }

        let mut by_host: BTreeMap<String, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            by_host.entry(task.host.clone()).or_default().push(task);
        }

        let mut report = TrackerTickReport::default();
        let per_host = join_all(by_host.into_values().map(|tasks| self.poll_host(tasks))).await;

        for results in per_host {
            for result in results {
                report.polled += 1;
                match result {
                    PollResult::Unchanged => {}
                    PollResult::Changed => report.changed += 1,
                    PollResult::Failed => report.failed += 1,
                    PollResult::Errored => {
                        report.failed += 1;
                        report.errored += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// 按顺序查询同一主机上的任务
    ///
    /// 主机第一次无法访问后，本轮剩余任务直接计为失败，不再发出请求。
    async fn poll_host(&self, tasks: Vec<Task>) -> Vec<PollResult> {
        let mut results = Vec::with_capacity(tasks.len());
        let mut host_down: Option<FleetError> = None;

        for task in tasks {
            if let Some(e) = &host_down {
                results.push(self.record_poll_failure(&task, e).await);
                continue;
            }

            match self.fetch_remote_status(&task).await {
                Ok(remote) => results.push(self.apply_remote_status(&task, &remote).await),
                Err(e) => {
                    results.push(self.record_poll_failure(&task, &e).await);
                    host_down = Some(e);
                }
            }
        }
        results
    }

    async fn fetch_remote_status(&self, task: &Task) -> FleetResult<String> {
        match tokio::time::timeout(
            self.request_timeout,
            self.client.fetch_task_status(&task.host, task.remote_task_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FleetError::unreachable(&task.worker, "任务状态查询超时")),
        }
    }

    async fn apply_remote_status(&self, task: &Task, remote: &str) -> PollResult {
        self.failures.lock().await.remove(&task.id);
        match TaskStatus::from_remote(remote) {
            Some(status) if status != task.status => {
                if self.transition(task, status).await {
                    PollResult::Changed
                } else {
                    PollResult::Failed
                }
            }
            Some(_) => PollResult::Unchanged,
            None => {
                warn!(
                    "任务 {} 返回未知的远端状态 '{}'，保持 {}",
                    task.id, remote, task.status
                );
                PollResult::Unchanged
            }
        }
    }

    async fn record_poll_failure(&self, task: &Task, e: &FleetError) -> PollResult {
        self.metrics.record_task_poll_failure();
        let count = {
            let mut failures = self.failures.lock().await;
            let count = failures.entry(task.id).or_insert(0);
            *count += 1;
            *count
        };
        debug!(
            "查询任务 {} (远端ID {}) 状态失败，第 {} 次: {}",
            task.id, task.remote_task_id, count, e
        );

        if count >= self.config.failure_threshold {
            warn!(
                "任务 {} 连续 {} 次无法查询状态，标记为 error",
                task.id, count
            );
            if self.transition(task, TaskStatus::Error).await {
                self.failures.lock().await.remove(&task.id);
                return PollResult::Errored;
            }
        }
        PollResult::Failed
    }

    async fn transition(&self, task: &Task, status: TaskStatus) -> bool {
        if let Err(e) = self.store.update_task_status(task.id, status).await {
            error!("更新任务 {} 状态为 {} 失败: {}", task.id, status, e);
            return false;
        }

        info!("任务 {} 状态变化: {} -> {}", task.id, task.status, status);
        self.metrics.record_task_status_change();
        let _ = self.events.send(FleetEvent::TaskStatusChanged {
            task_id: task.id,
            sha256: task.sha256.clone(),
            from: task.status,
            to: status,
        });
        true
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动任务状态轮询，间隔 {} 秒",
            self.config.poll_interval_seconds
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(report) => debug!(
                            "任务状态轮询完成: 查询 {}，变化 {}，失败 {}",
                            report.polled, report.changed, report.failed
                        ),
                        Err(e) => error!("任务状态轮询失败: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止任务状态轮询");
                    break;
                }
            }
        }
    }
}
