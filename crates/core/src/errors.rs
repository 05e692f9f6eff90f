use thiserror::Error;

/// 集群协调器错误类型定义
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("Worker不可达: {worker} - {message}")]
    WorkerUnreachable { worker: String, message: String },

    #[error("提交转发失败: {worker} - {message}")]
    ForwardFailed { worker: String, message: String },

    #[error("Worker未找到: {name}")]
    WorkerNotFound { name: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: uuid::Uuid },

    #[error("无效的提交: {0}")]
    InvalidSubmission(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl FleetError {
    pub fn unreachable(worker: impl Into<String>, message: impl ToString) -> Self {
        Self::WorkerUnreachable {
            worker: worker.into(),
            message: message.to_string(),
        }
    }

    pub fn forward_failed(worker: impl Into<String>, message: impl ToString) -> Self {
        Self::ForwardFailed {
            worker: worker.into(),
            message: message.to_string(),
        }
    }

    /// 单个Worker的网络故障，下一轮可重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FleetError::WorkerUnreachable { .. } | FleetError::ForwardFailed { .. }
        )
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type FleetResult<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FleetError::unreachable("w1", "timeout").is_transient());
        assert!(FleetError::forward_failed("w1", "HTTP 500").is_transient());
        assert!(!FleetError::StoreUnavailable("down".to_string()).is_transient());
        assert!(!FleetError::InvalidSubmission("no hash".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = FleetError::unreachable("cuckoo-01", "connection refused");
        assert_eq!(
            err.to_string(),
            "Worker不可达: cuckoo-01 - connection refused"
        );
    }
}
