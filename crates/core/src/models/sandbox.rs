//! 沙箱节点 REST 接口的响应结构

use serde::{Deserialize, Serialize};

/// `/cuckoo/status` 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SandboxStatus {
    pub tasks: TaskCounts,
    #[serde(default)]
    pub diskspace: DiskSpace,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub protocol_version: u32,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub machines: MachineCounts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskCounts {
    #[serde(default)]
    pub total: u32,
    pub pending: u32,
    #[serde(default)]
    pub running: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub reported: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiskSpace {
    #[serde(default)]
    pub analyses: DiskUsage,
    #[serde(default)]
    pub binaries: DiskUsage,
    #[serde(default)]
    pub temporary: DiskUsage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiskUsage {
    pub total: i64,
    pub free: i64,
    pub used: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MachineCounts {
    pub available: u32,
    pub total: u32,
}

/// `/tasks/create/file` 响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitResponse {
    pub task_id: u64,
}

/// `/tasks/view/{id}` 响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskViewResponse {
    pub task: RemoteTaskView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteTaskView {
    pub id: u64,
    pub status: String,
}
