use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    pub poll_interval_seconds: u64,
    /// 连续失败多少次后将Worker标记为 unknown
    pub failure_threshold: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            failure_threshold: 3,
        }
    }
}

impl HealthMonitorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("健康检查间隔必须大于0"));
        }
        if self.failure_threshold == 0 {
            return Err(anyhow::anyhow!("健康检查失败阈值必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskTrackerConfig {
    pub poll_interval_seconds: u64,
    /// 连续不可达多少次后将任务标记为 error
    pub failure_threshold: u32,
}

impl Default for TaskTrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            failure_threshold: 3,
        }
    }
}

impl TaskTrackerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("任务状态轮询间隔必须大于0"));
        }
        if self.failure_threshold == 0 {
            return Err(anyhow::anyhow!("任务状态失败阈值必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklogConfig {
    /// 未显式设置过期时间的提交在队列中的存活时间，None 表示永不过期
    pub submission_ttl_seconds: Option<u64>,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            submission_ttl_seconds: Some(3600),
        }
    }
}

impl BacklogConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.submission_ttl_seconds == Some(0) {
            return Err(anyhow::anyhow!("提交存活时间必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub strategy: String, // "tier_ranked"
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            strategy: "tier_ranked".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_strategies = ["tier_ranked"];
        if !valid_strategies.contains(&self.strategy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的调度策略: {}，支持的策略: {:?}",
                self.strategy,
                valid_strategies
            ));
        }
        Ok(())
    }
}
