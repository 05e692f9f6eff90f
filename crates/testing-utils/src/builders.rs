//! Test data builders for creating test entities

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use fleet_core::models::{Submission, Task, TaskStatus, Worker, WorkerStatus};
use uuid::Uuid;

/// Builder for creating test Worker entities
pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            worker: Worker::new(name, format!("{name}.sandbox.local"), WorkerStatus::Active),
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.worker.host = host.to_string();
        self
    }

    pub fn with_status(mut self, status: WorkerStatus) -> Self {
        self.worker.status = status;
        self
    }

    pub fn inactive(self) -> Self {
        self.with_status(WorkerStatus::Inactive)
    }

    /// 设置观测到的待处理任务数，并视为已被观测
    pub fn with_pending(mut self, pending: u32) -> Self {
        self.worker.pending_count = pending;
        self.worker.observed_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}

/// Builder for creating test Submission entities
pub struct SubmissionBuilder {
    submission: Submission,
}

impl SubmissionBuilder {
    pub fn new() -> Self {
        Self {
            submission: Submission::new(
                "sample.exe",
                "/tmp/sample.exe",
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            ),
        }
    }

    pub fn with_sha256(mut self, sha256: &str) -> Self {
        self.submission.sha256 = sha256.to_string();
        self
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.submission.file_name = file_name.to_string();
        self
    }

    pub fn with_payload_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.submission.payload_path = path.into();
        self
    }

    pub fn with_md5(mut self, md5: &str) -> Self {
        self.submission.md5 = Some(md5.to_string());
        self
    }

    pub fn expires_at(mut self, deadline: DateTime<Utc>) -> Self {
        self.submission.expires_at = Some(deadline);
        self
    }

    /// 已经过期的提交
    pub fn expired(self) -> Self {
        self.expires_at(Utc::now() - Duration::seconds(1))
    }

    pub fn build(self) -> Submission {
        self.submission
    }
}

impl Default for SubmissionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: Uuid::new_v4(),
                sha256: "ab".repeat(32),
                md5: None,
                worker: "cuckoo-01".to_string(),
                host: "cuckoo-01.sandbox.local".to_string(),
                remote_task_id: 1,
                status: TaskStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_worker(mut self, worker: &str, host: &str) -> Self {
        self.task.worker = worker.to_string();
        self.task.host = host.to_string();
        self
    }

    pub fn with_remote_task_id(mut self, remote_task_id: u64) -> Self {
        self.task.remote_task_id = remote_task_id;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
