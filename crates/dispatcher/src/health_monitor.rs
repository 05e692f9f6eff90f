use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_core::config::models::HealthMonitorConfig;
use fleet_core::models::{PopulationTier, Worker, WorkerStatus};
use fleet_core::{FleetError, FleetResult, SandboxClient};
use fleet_infrastructure::FleetMetrics;
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, DrainReport};
use crate::registry::FleetRegistry;

/// 一轮健康检查的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthTickReport {
    pub polled: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 上一轮检查仍未结束而跳过的Worker
    pub skipped: usize,
    pub drain: DrainReport,
}

/// 周期性查询每个沙箱的状态接口，维护待处理数和Worker状态
pub struct HealthMonitor {
    registry: Arc<FleetRegistry>,
    client: Arc<dyn SandboxClient>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<FleetMetrics>,
    config: HealthMonitorConfig,
    poll_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<FleetRegistry>,
        client: Arc<dyn SandboxClient>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<FleetMetrics>,
        config: HealthMonitorConfig,
    ) -> Self {
        let poll_timeout = Duration::from_secs(config.poll_interval_seconds);
        Self {
            registry,
            client,
            dispatcher,
            metrics,
            config,
            poll_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// 单个Worker状态查询的超时时间，默认等于检查间隔
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// 执行一轮健康检查，然后尝试排空积压队列
    pub async fn poll_once(&self) -> HealthTickReport {
        if let Err(e) = self.registry.refresh().await {
            warn!("刷新Worker清单失败，沿用上一次的快照: {}", e);
        }

        let snapshot = self.registry.snapshot().await;
        let candidates: Vec<Worker> = snapshot
            .workers()
            .filter(|w| w.status != WorkerStatus::Inactive)
            .cloned()
            .collect();
        drop(snapshot);

        let mut report = HealthTickReport::default();
        let mut targets = Vec::with_capacity(candidates.len());
        {
            let mut in_flight = self.in_flight.lock().await;
            for worker in candidates {
                if in_flight.insert(worker.name.clone()) {
                    targets.push(worker);
                } else {
                    debug!("Worker {} 的上一次状态查询仍在进行，跳过", worker.name);
                    report.skipped += 1;
                }
            }
        }

        report.polled = targets.len();
        let results = join_all(targets.iter().map(|worker| self.poll_worker(worker))).await;

        for (worker, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    debug!("Worker {} 健康检查失败: {}", worker.name, e);
                    report.failed += 1;
                }
            }
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            for worker in &targets {
                in_flight.remove(&worker.name);
            }
        }

        let snapshot = self.registry.snapshot().await;
        self.metrics.update_active_workers(snapshot.active_count());
        drop(snapshot);

        report.drain = self.dispatcher.drain_backlog(Utc::now()).await;
        report
    }

    async fn poll_worker(&self, worker: &Worker) -> FleetResult<()> {
        let observed_at = Utc::now();
        let result = match tokio::time::timeout(self.poll_timeout, self.client.fetch_status(worker))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FleetError::unreachable(&worker.name, "状态查询超时")),
        };

        match result {
            Ok(status) => {
                let pending = status.tasks.pending;
                debug!(
                    "Worker {} 待处理任务数: {} ({})",
                    worker.name,
                    pending,
                    PopulationTier::classify(pending)
                );
                self.registry
                    .record_success(&worker.name, pending, observed_at)
                    .await;
                Ok(())
            }
            Err(e) => {
                self.metrics.record_health_poll_failure();
                self.registry.record_failure(&worker.name).await;
                Err(e)
            }
        }
    }

    /// 按配置的间隔循环执行健康检查，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动健康检查循环，间隔 {} 秒，失败阈值 {}",
            self.config.poll_interval_seconds, self.config.failure_threshold
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.poll_once().await;
                    debug!(
                        "健康检查完成: 查询 {}，成功 {}，失败 {}，跳过 {}",
                        report.polled, report.succeeded, report.failed, report.skipped
                    );
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止健康检查循环");
                    break;
                }
            }
        }
    }
}
