use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CronJobDefinition, ProcessJobDefinition, Schedule};

/// 配置文件中声明的外部命令
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow::anyhow!("命令不能为空"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub time: Schedule,
    pub command: CommandSpec,
}

impl CronJobConfig {
    pub fn definition(&self) -> CronJobDefinition {
        CronJobDefinition {
            name: self.name.clone(),
            enabled: self.enabled,
            schedule: self.time.clone(),
        }
    }
}

/// 定时调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    pub enabled: bool,
    /// 表达式作业的评估周期
    pub tick_interval_seconds: u64,
    /// 间隔作业倒计时的推进步长
    pub timer_tick_seconds: u64,
    /// 单次运行持有锁的最长时间
    pub lock_ttl_seconds: u64,
    pub jobs: Vec<CronJobConfig>,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_seconds: 60,
            timer_tick_seconds: 1,
            lock_ttl_seconds: 1200,
            jobs: Vec::new(),
        }
    }
}

impl CronConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }
        // 每次 tick 只评估当前分钟，间隔必须整除60才不会跳过任何一分钟
        if self.tick_interval_seconds > 60 || 60 % self.tick_interval_seconds != 0 {
            return Err(anyhow::anyhow!(
                "调度间隔必须是60的约数: {}",
                self.tick_interval_seconds
            ));
        }
        if self.timer_tick_seconds == 0 {
            return Err(anyhow::anyhow!("计时器步长必须大于0"));
        }
        if self.lock_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("定时作业锁TTL必须大于0"));
        }
        for job in &self.jobs {
            if job.name.is_empty() {
                return Err(anyhow::anyhow!("定时作业名称不能为空"));
            }
            job.command
                .validate()
                .map_err(|e| anyhow::anyhow!("定时作业 {} 配置无效: {e}", job.name))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorMode {
    /// 每个作业独占一个执行上下文，启动时拿不到锁即终止该上下文
    Dedicated,
    /// 在调用方的执行上下文内运行，拿不到锁直接返回
    InProcess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessJobConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub restart: bool,
    #[serde(default = "default_restart_delay")]
    pub restart_delay_seconds: u64,
    pub command: CommandSpec,
}

impl ProcessJobConfig {
    pub fn definition(&self) -> ProcessJobDefinition {
        ProcessJobDefinition {
            name: self.name.clone(),
            enabled: self.enabled,
            restart: self.restart,
            restart_delay_seconds: self.restart_delay_seconds,
        }
    }
}

/// 常驻进程监督配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub enabled: bool,
    pub mode: SupervisorMode,
    pub lock_ttl_seconds: u64,
    /// 续期周期 = TTL - margin
    pub lock_refresh_margin_seconds: u64,
    pub acquire_retry_interval_seconds: u64,
    pub acquire_timeout_seconds: u64,
    pub startup_jitter_min_ms: u64,
    pub startup_jitter_max_ms: u64,
    pub jobs: Vec<ProcessJobConfig>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SupervisorMode::Dedicated,
            lock_ttl_seconds: 3600,
            lock_refresh_margin_seconds: 5,
            acquire_retry_interval_seconds: 5,
            acquire_timeout_seconds: 20,
            startup_jitter_min_ms: 500,
            startup_jitter_max_ms: 2000,
            jobs: Vec::new(),
        }
    }
}

impl ProcessConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.lock_ttl_seconds
                .saturating_sub(self.lock_refresh_margin_seconds)
                .max(1),
        )
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lock_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("进程锁TTL必须大于0"));
        }
        if self.lock_refresh_margin_seconds >= self.lock_ttl_seconds {
            return Err(anyhow::anyhow!("锁续期余量必须小于锁TTL"));
        }
        if self.acquire_retry_interval_seconds == 0 {
            return Err(anyhow::anyhow!("锁获取重试间隔必须大于0"));
        }
        if self.startup_jitter_min_ms > self.startup_jitter_max_ms {
            return Err(anyhow::anyhow!("启动抖动下限不能大于上限"));
        }
        for job in &self.jobs {
            if job.name.is_empty() {
                return Err(anyhow::anyhow!("进程作业名称不能为空"));
            }
            job.command
                .validate()
                .map_err(|e| anyhow::anyhow!("进程作业 {} 配置无效: {e}", job.name))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandlerConfig {
    pub name: String,
    pub command: CommandSpec,
}

/// 异步任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
    /// 人工重试次数上限，未设置时不限制
    pub max_retry_attempts: Option<u32>,
    pub handlers: Vec<TaskHandlerConfig>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            max_retry_attempts: None,
            handlers: Vec::new(),
        }
    }
}

impl TaskConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("任务队列容量必须大于0"));
        }
        for handler in &self.handlers {
            if handler.name.is_empty() {
                return Err(anyhow::anyhow!("任务处理器名称不能为空"));
            }
            handler
                .command
                .validate()
                .map_err(|e| anyhow::anyhow!("任务处理器 {} 配置无效: {e}", handler.name))?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_restart_delay() -> u64 {
    5
}
