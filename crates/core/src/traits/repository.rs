//! 持久化协作方接口
//!
//! Worker 与任务记录的存储由外部系统负责，协调核心只通过 [`FleetStore`]
//! 访问。所有方法在后端不可达时返回 [`FleetError::StoreUnavailable`]，
//! 且不返回部分结果。
//!
//! [`FleetError::StoreUnavailable`]: crate::FleetError::StoreUnavailable

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Task, TaskStatus, Worker, WorkerStatus};
use crate::FleetResult;

/// 集群存储接口
#[async_trait]
pub trait FleetStore: Send + Sync {
    /// 列出所有已注册的Worker
    async fn list_workers(&self) -> FleetResult<Vec<Worker>>;

    /// 按名称获取Worker
    async fn get_worker(&self, name: &str) -> FleetResult<Option<Worker>>;

    /// 更新Worker生命周期状态
    async fn update_worker_status(&self, name: &str, status: WorkerStatus) -> FleetResult<()>;

    /// 创建任务记录
    async fn create_task(&self, task: &Task) -> FleetResult<()>;

    /// 更新任务状态
    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> FleetResult<()>;

    /// 列出所有未进入终态的任务
    async fn list_pending_tasks(&self) -> FleetResult<Vec<Task>>;
}
