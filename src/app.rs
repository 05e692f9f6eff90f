use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_core::{AppConfig, FleetEvent, FleetStore, SandboxClient, Submission};
use fleet_dispatcher::{
    strategy_from_name, BacklogQueue, DispatchOutcome, Dispatcher, FleetRegistry, HealthMonitor,
    TaskStatusTracker, WorkerSelectionStrategy,
};
use fleet_infrastructure::{FleetMetrics, HttpSandboxClient, InMemoryFleetStore};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 主应用程序
///
/// 负责组装各个组件并启动健康检查、任务状态轮询和事件日志三个后台循环。
/// 提交入口通过 [`Application::submit`] 或 [`Application::dispatcher`] 接入。
pub struct Application {
    config: AppConfig,
    registry: Arc<FleetRegistry>,
    dispatcher: Arc<Dispatcher>,
    health_monitor: Arc<HealthMonitor>,
    task_tracker: Arc<TaskStatusTracker>,
    events: broadcast::Sender<FleetEvent>,
}

impl Application {
    /// 使用配置中的种子Worker和 HTTP 沙箱客户端创建应用
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn FleetStore> = Arc::new(InMemoryFleetStore::from_config(&config.fleet));
        let client: Arc<dyn SandboxClient> =
            Arc::new(HttpSandboxClient::new(&config.sandbox).context("创建沙箱客户端失败")?);

        Self::with_components(config, store, client).await
    }

    /// 使用指定的存储和沙箱客户端创建应用
    pub async fn with_components(
        config: AppConfig,
        store: Arc<dyn FleetStore>,
        client: Arc<dyn SandboxClient>,
    ) -> Result<Self> {
        info!(
            "初始化沙箱集群协调器，共 {} 个种子Worker",
            config.fleet.workers.len()
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let metrics = Arc::new(FleetMetrics::new());

        let registry = Arc::new(FleetRegistry::new(
            Arc::clone(&store),
            config.health_monitor.failure_threshold,
            events.clone(),
        ));
        if let Err(e) = registry.refresh().await {
            warn!("初始加载Worker清单失败，等待下一轮健康检查: {}", e);
        }

        let ttl = config
            .backlog
            .submission_ttl_seconds
            .map(|secs| chrono::Duration::seconds(secs as i64));
        let backlog = Arc::new(BacklogQueue::new(ttl, events.clone()));

        let strategy: Arc<dyn WorkerSelectionStrategy> =
            strategy_from_name(&config.dispatcher.strategy)
                .map(Arc::<dyn WorkerSelectionStrategy>::from)
                .with_context(|| format!("未知的调度策略: {}", config.dispatcher.strategy))?;

        // 转发超时稍大于上传超时，让客户端自己的超时先生效
        let forward_timeout = Duration::from_secs(config.sandbox.submit_timeout_seconds + 5);
        let dispatcher = Arc::new(
            Dispatcher::new(
                Arc::clone(&registry),
                Arc::clone(&store),
                Arc::clone(&client),
                backlog,
                strategy,
                Arc::clone(&metrics),
                events.clone(),
            )
            .with_forward_timeout(forward_timeout),
        );

        let health_monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&client),
            Arc::clone(&dispatcher),
            Arc::clone(&metrics),
            config.health_monitor.clone(),
        ));

        let task_tracker = Arc::new(TaskStatusTracker::new(
            store,
            client,
            metrics,
            events.clone(),
            config.task_tracker.clone(),
        ));

        Ok(Self {
            config,
            registry,
            dispatcher,
            health_monitor,
            task_tracker,
            events,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<FleetRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FleetEvent> {
        self.events.subscribe()
    }

    pub async fn submit(&self, submission: Submission) -> fleet_core::FleetResult<DispatchOutcome> {
        self.dispatcher.dispatch(submission).await
    }

    /// 运行所有后台循环，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动沙箱集群协调器");

        let monitor_handle = {
            let monitor = Arc::clone(&self.health_monitor);
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move { monitor.run(shutdown_rx).await })
        };

        let tracker_handle = {
            let tracker = Arc::clone(&self.task_tracker);
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move { tracker.run(shutdown_rx).await })
        };

        let events_handle = {
            let events = self.events.subscribe();
            tokio::spawn(log_events(events, shutdown_rx))
        };

        let (monitor, tracker, events) = tokio::join!(monitor_handle, tracker_handle, events_handle);
        for (name, result) in [("健康检查", monitor), ("任务状态轮询", tracker), ("事件日志", events)] {
            if let Err(e) = result {
                error!("{}循环异常退出: {}", name, e);
            }
        }

        let remaining = self.dispatcher.backlog().len().await;
        if remaining > 0 {
            warn!("关闭时积压队列中仍有 {} 个提交未调度", remaining);
        }

        info!("沙箱集群协调器已停止");
        Ok(())
    }
}

async fn log_events(
    mut events: broadcast::Receiver<FleetEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => info!(event = event.name(), "{}", payload),
                    Err(e) => debug!("序列化事件失败: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("事件日志落后，丢弃了 {} 个事件", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }
}
