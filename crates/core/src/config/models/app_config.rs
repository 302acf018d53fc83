use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    control_observability::{ControlConfig, ObservabilityConfig},
    jobs::{CronConfig, ProcessConfig, TaskConfig},
    lock_database::{mask_url_credentials, DatabaseConfig, LockConfig, ServerConfig},
};

/// System configuration
///
/// 所有字段都有默认值，配置文件只需要写与默认值不同的部分。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub lock: LockConfig,
    pub database: DatabaseConfig,
    pub cron: CronConfig,
    pub process: ProcessConfig,
    pub task: TaskConfig,
    pub control: ControlConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: ORCHESTRATOR_)
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
                "config/orchestrator.toml",
                "orchestrator.toml",
                "/etc/orchestrator/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
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

    pub fn instance_id(&self) -> String {
        self.server.resolve_instance_id()
    }

    /// 屏蔽连接串中密码后的副本，用于对外展示
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.database.url = mask_url_credentials(&config.database.url);
        config.lock.redis_url = mask_url_credentials(&config.lock.redis_url);
        config
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.lock.validate().context("分布式锁配置验证失败")?;
        self.database.validate().context("数据库配置验证失败")?;
        self.cron.validate().context("定时作业配置验证失败")?;
        self.process.validate().context("进程作业配置验证失败")?;
        self.task.validate().context("任务配置验证失败")?;
        self.control.validate().context("控制通道配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
