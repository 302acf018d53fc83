use serde::{Deserialize, Serialize};

/// 本地控制通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub request_timeout_seconds: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9502".to_string(),
            request_timeout_seconds: 5,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("控制通道地址格式无效: {}", self.bind_address));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("控制请求超时时间必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }
        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.log_format));
        }
        Ok(())
    }
}
