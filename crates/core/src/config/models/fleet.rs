use serde::{Deserialize, Serialize};

use crate::models::{Worker, WorkerStatus};

/// 初始Worker清单，用于填充内置存储
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub workers: Vec<WorkerSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSeed {
    pub name: String,
    pub host: String,
    #[serde(default = "default_seed_status")]
    pub status: WorkerStatus,
}

fn default_seed_status() -> WorkerStatus {
    WorkerStatus::Active
}

impl From<&WorkerSeed> for Worker {
    fn from(seed: &WorkerSeed) -> Self {
        Worker::new(seed.name.clone(), seed.host.clone(), seed.status)
    }
}

impl FleetConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = std::collections::HashSet::new();
        for seed in &self.workers {
            if seed.name.trim().is_empty() {
                return Err(anyhow::anyhow!("Worker名称不能为空"));
            }
            if seed.host.trim().is_empty() {
                return Err(anyhow::anyhow!("Worker {} 的地址不能为空", seed.name));
            }
            if !names.insert(seed.name.as_str()) {
                return Err(anyhow::anyhow!("Worker名称重复: {}", seed.name));
            }
        }
        Ok(())
    }
}

/// 沙箱节点 REST 接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub scheme: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
    /// 文件上传单独使用更长的超时
    pub submit_timeout_seconds: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            port: 8090,
            request_timeout_seconds: 10,
            submit_timeout_seconds: 60,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(anyhow::anyhow!("不支持的协议: {}", self.scheme));
        }
        if self.port == 0 {
            return Err(anyhow::anyhow!("沙箱端口必须大于0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }
        if self.submit_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("提交超时时间必须大于0"));
        }
        Ok(())
    }
}
