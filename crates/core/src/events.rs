use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{TaskStatus, WorkerStatus};

/// 对外通知的集群事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FleetEvent {
    SubmissionDispatched {
        submission_id: Uuid,
        sha256: String,
        worker: String,
        remote_task_id: u64,
    },
    SubmissionQueued {
        submission_id: Uuid,
        sha256: String,
        backlog_depth: usize,
    },
    /// 积压的提交在找到可用Worker前已过期
    SubmissionAbandoned {
        submission_id: Uuid,
        sha256: String,
        submitted_at: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    },
    WorkerStatusChanged {
        worker: String,
        from: WorkerStatus,
        to: WorkerStatus,
    },
    TaskStatusChanged {
        task_id: Uuid,
        sha256: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl FleetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FleetEvent::SubmissionDispatched { .. } => "submission_dispatched",
            FleetEvent::SubmissionQueued { .. } => "submission_queued",
            FleetEvent::SubmissionAbandoned { .. } => "submission_abandoned",
            FleetEvent::WorkerStatusChanged { .. } => "worker_status_changed",
            FleetEvent::TaskStatusChanged { .. } => "task_status_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = FleetEvent::WorkerStatusChanged {
            worker: "cuckoo-01".to_string(),
            from: WorkerStatus::Active,
            to: WorkerStatus::Unknown,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "worker_status_changed");
        assert_eq!(json["to"], "unknown");
        assert_eq!(event.name(), "worker_status_changed");
    }
}
