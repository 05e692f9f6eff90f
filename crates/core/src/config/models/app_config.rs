use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    fleet::{FleetConfig, SandboxConfig},
    monitoring::{BacklogConfig, DispatcherConfig, HealthMonitorConfig, TaskTrackerConfig},
    observability::ObservabilityConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fleet: FleetConfig,
    pub sandbox: SandboxConfig,
    pub health_monitor: HealthMonitorConfig,
    pub task_tracker: TaskTrackerConfig,
    pub backlog: BacklogConfig,
    pub dispatcher: DispatcherConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: FLEET_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/fleet.toml",
                "fleet.toml",
                "/etc/sandbox-fleet/config.toml",
            ];

            // 找不到配置文件时使用各字段的默认值
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.fleet.validate().context("Worker清单配置验证失败")?;
        self.sandbox.validate().context("沙箱接口配置验证失败")?;
        self.health_monitor
            .validate()
            .context("健康检查配置验证失败")?;
        self.task_tracker
            .validate()
            .context("任务状态追踪配置验证失败")?;
        self.backlog.validate().context("积压队列配置验证失败")?;
        self.dispatcher
            .validate()
            .context("Dispatcher配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
