use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9100".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.log_level));
        }
        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(anyhow::anyhow!(
                "无效的指标监听地址: {}",
                self.metrics_bind_address
            ));
        }
        Ok(())
    }
}
