//! 协调器的关闭流程：广播关闭信号，然后在宽限期内等待健康检查、
//! 任务状态轮询和事件日志循环退出。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// 关闭结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// 所有循环在宽限期内退出
    Graceful,
    /// 后台任务 panic 或被取消
    Failed,
    /// 宽限期结束时仍有循环未退出
    TimedOut,
}

/// 优雅关闭管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
    is_shutdown: Arc<RwLock<bool>>,
    grace_period: Duration,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx: Arc::new(RwLock::new(Some(shutdown_tx))),
            is_shutdown: Arc::new(RwLock::new(false)),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// 订阅关闭信号，关闭之后订阅会立即收到信号
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        let shutdown_tx = self.shutdown_tx.read().await;
        if let Some(ref tx) = *shutdown_tx {
            tx.subscribe()
        } else {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            rx
        }
    }

    /// 向所有订阅者广播关闭信号，重复调用无效
    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        if *is_shutdown {
            debug!("关闭管理器已经触发过关闭");
            return;
        }

        info!("触发系统关闭");
        *is_shutdown = true;

        let mut shutdown_tx = self.shutdown_tx.write().await;
        if let Some(tx) = shutdown_tx.take() {
            debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
            let _ = tx.send(());
        }

        info!("关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.is_shutdown.read().await
    }

    /// 触发关闭并等待应用任务在宽限期内结束，超时后放弃等待
    pub async fn shutdown_and_wait(&self, app_handle: JoinHandle<()>) -> ShutdownOutcome {
        self.shutdown().await;

        match tokio::time::timeout(self.grace_period, app_handle).await {
            Ok(Ok(())) => {
                info!("应用已优雅关闭");
                ShutdownOutcome::Graceful
            }
            Ok(Err(e)) => {
                error!("应用关闭时发生错误: {e}");
                ShutdownOutcome::Failed
            }
            Err(_) => {
                warn!(
                    "应用在 {} 秒内未能关闭，强制退出",
                    self.grace_period.as_secs()
                );
                ShutdownOutcome::TimedOut
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
