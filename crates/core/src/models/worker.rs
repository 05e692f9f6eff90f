use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// LOW/MEDIUM 分界线：待处理任务数小于该值为 LOW
pub const TASK_LOW_COUNT: u32 = 25;
/// MEDIUM/HIGH 分界线：待处理任务数大于等于该值为 HIGH
pub const TASK_MEDIUM_COUNT: u32 = 50;

/// 沙箱Worker节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub name: String,
    pub host: String,
    pub status: WorkerStatus,
    /// 最近一次观测到的待处理任务数
    #[serde(default)]
    pub pending_count: u32,
    /// 最近一次成功观测的时间，None 表示尚未被健康检查观测过
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

impl Worker {
    pub fn new(name: impl Into<String>, host: impl Into<String>, status: WorkerStatus) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            status,
            pending_count: 0,
            observed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, WorkerStatus::Active)
    }

    /// 负载层级，始终由最新的待处理任务数计算得出
    pub fn tier(&self) -> PopulationTier {
        PopulationTier::classify(self.pending_count)
    }

    /// 是否可以参与调度：状态为 active 且至少被成功观测过一次
    pub fn is_eligible(&self) -> bool {
        self.is_active() && self.observed_at.is_some()
    }
}

/// Worker生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Inactive,
    Unknown,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Inactive => "inactive",
            WorkerStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(WorkerStatus::Active),
            "inactive" => Ok(WorkerStatus::Inactive),
            "unknown" => Ok(WorkerStatus::Unknown),
            _ => Err(format!("无效的Worker状态: {s}")),
        }
    }
}

/// 负载层级
///
/// 变体顺序即调度优先级：LOW < MEDIUM < HIGH。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PopulationTier {
    Low,
    Medium,
    High,
}

impl PopulationTier {
    /// 按待处理任务数分级，边界值 25 和 50 归入较高一级
    pub fn classify(pending: u32) -> Self {
        if pending < TASK_LOW_COUNT {
            PopulationTier::Low
        } else if pending < TASK_MEDIUM_COUNT {
            PopulationTier::Medium
        } else {
            PopulationTier::High
        }
    }
}

impl fmt::Display for PopulationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PopulationTier::Low => "low",
            PopulationTier::Medium => "medium",
            PopulationTier::High => "high",
        };
        f.write_str(s)
    }
}
