use async_trait::async_trait;

use crate::models::{SandboxStatus, Submission, Worker};
use crate::FleetResult;

/// 沙箱节点网络客户端
///
/// 实现必须为每次调用设置有限的超时时间。
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// 查询节点状态，失败时返回 `WorkerUnreachable`
    async fn fetch_status(&self, worker: &Worker) -> FleetResult<SandboxStatus>;

    /// 提交文件并返回节点分配的任务ID，失败时返回 `ForwardFailed`
    async fn submit(&self, worker: &Worker, submission: &Submission) -> FleetResult<u64>;

    /// 查询远端任务状态，返回节点原始的状态词
    async fn fetch_task_status(&self, host: &str, remote_task_id: u64) -> FleetResult<String>;
}
