use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Submission;

/// 已被Worker接收的分析任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub sha256: String,
    pub md5: Option<String>,
    /// 承接任务的Worker名称
    pub worker: String,
    /// Worker地址，状态轮询直接使用
    pub host: String,
    /// Worker端分配的任务ID
    pub remote_task_id: u64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 在转发成功后为提交创建任务记录
    pub fn accepted(submission: &Submission, worker: &str, host: &str, remote_task_id: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sha256: submission.sha256.clone(),
            md5: submission.md5.clone(),
            worker: worker.to_string(),
            host: host.to_string(),
            remote_task_id,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Reported,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Reported | TaskStatus::Error
        )
    }

    /// 将沙箱返回的状态词映射为本地状态，无法识别时返回 None
    pub fn from_remote(remote: &str) -> Option<Self> {
        match remote.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "reported" => Some(TaskStatus::Reported),
            "failed_analysis" | "failed_processing" | "failed_reporting" | "error" => {
                Some(TaskStatus::Error)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Reported => "reported",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Reported.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
    }

    #[test]
    fn test_remote_vocabulary() {
        assert_eq!(TaskStatus::from_remote("pending"), Some(TaskStatus::Pending));
        assert_eq!(TaskStatus::from_remote("running"), Some(TaskStatus::Running));
        assert_eq!(TaskStatus::from_remote("completed"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::from_remote("reported"), Some(TaskStatus::Reported));
        assert_eq!(TaskStatus::from_remote("failed_analysis"), Some(TaskStatus::Error));
        assert_eq!(TaskStatus::from_remote("failed_processing"), Some(TaskStatus::Error));
        assert_eq!(TaskStatus::from_remote(" Reported "), Some(TaskStatus::Reported));
        assert_eq!(TaskStatus::from_remote("recovered"), None);
    }

    #[test]
    fn test_accepted_task_starts_pending() {
        let submission = Submission::new("sample.exe", "/tmp/sample.exe", "ab12");
        let task = Task::accepted(&submission, "cuckoo-01", "10.0.0.1", 42);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.remote_task_id, 42);
        assert_eq!(task.sha256, "ab12");
        assert_eq!(task.worker, "cuckoo-01");
    }
}
