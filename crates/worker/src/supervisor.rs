use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use orchestrator_core::{
    config::ProcessConfig,
    traits::{LockCoordinator, ProcessJob},
    utils::run_guarded,
    JobRegistry, ProcessJobDefinition, RuntimeStats, SchedulerError, SchedulerResult,
};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub lock_ttl: Duration,
    pub refresh_interval: Duration,
    pub acquire_retry_interval: Duration,
    pub acquire_timeout: Duration,
    pub startup_jitter_min: Duration,
    pub startup_jitter_max: Duration,
    pub key_prefix: String,
}

impl SupervisorSettings {
    pub fn from_config(config: &ProcessConfig, key_prefix: &str) -> Self {
        Self {
            lock_ttl: config.lock_ttl(),
            refresh_interval: config.refresh_interval(),
            acquire_retry_interval: Duration::from_secs(config.acquire_retry_interval_seconds),
            acquire_timeout: Duration::from_secs(config.acquire_timeout_seconds),
            startup_jitter_min: Duration::from_millis(config.startup_jitter_min_ms),
            startup_jitter_max: Duration::from_millis(config.startup_jitter_max_ms),
            key_prefix: key_prefix.to_string(),
        }
    }

    /// 不带启动抖动的设置
    pub fn without_jitter(mut self) -> Self {
        self.startup_jitter_min = Duration::ZERO;
        self.startup_jitter_max = Duration::ZERO;
        self
    }

    fn jitter(&self) -> Duration {
        if self.startup_jitter_max.is_zero() {
            return Duration::ZERO;
        }
        let min = self.startup_jitter_min.as_millis() as u64;
        let max = (self.startup_jitter_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from_config(&ProcessConfig::default(), "orchestrator")
    }
}

/// 常驻进程监督器
///
/// 一次 `run` 覆盖一个作业的完整生命周期：启动抖动、有限次重试的锁获取、
/// 持锁期间的周期续期、按重启策略循环执行作业体，以及退出时无条件释放锁。
pub struct ProcessSupervisor {
    registry: Arc<JobRegistry>,
    lock: Arc<dyn LockCoordinator>,
    stats: Arc<RuntimeStats>,
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    pub fn new(
        registry: Arc<JobRegistry>,
        lock: Arc<dyn LockCoordinator>,
        stats: Arc<RuntimeStats>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            registry,
            lock,
            stats,
            settings,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn lock_key(&self, job_name: &str) -> String {
        format!("{}:process_server:{}", self.settings.key_prefix, job_name)
    }

    /// 运行作业直到其自然结束
    pub async fn run(&self, name: &str) -> SchedulerResult<()> {
        self.run_until(name, std::future::pending()).await
    }

    /// 运行作业直到其自然结束或 `shutdown` 完成
    ///
    /// 启动时拿不到锁返回 `LockUnavailable`，锁服务不可达返回 `CoordinatorUnavailable`；
    /// 作业不存在或已禁用时直接返回 `Ok`。
    pub async fn run_until<S>(&self, name: &str, shutdown: S) -> SchedulerResult<()>
    where
        S: Future<Output = ()> + Send,
    {
        let Some(registered) = self.registry.process_job(name) else {
            warn!(job = %name, "进程作业不存在: {}", name);
            return Ok(());
        };
        let definition = registered.definition.clone();
        if !definition.enabled {
            info!(job = %name, "进程作业已禁用，跳过");
            return Ok(());
        }
        let job = Arc::clone(&registered.job);
        let key = self.lock_key(name);
        tokio::pin!(shutdown);

        let jitter = self.settings.jitter();
        if !jitter.is_zero() {
            debug!(job = %name, "启动前等待 {}ms", jitter.as_millis());
            tokio::select! {
                _ = sleep(jitter) => {}
                _ = &mut shutdown => return Ok(()),
            }
        }

        let acquired = tokio::select! {
            result = self.acquire_with_retry(&key) => result?,
            _ = &mut shutdown => return Ok(()),
        };
        if !acquired {
            error!(job = %name, key = %key, "在 {:?} 内未能获取进程锁", self.settings.acquire_timeout);
            return Err(SchedulerError::LockUnavailable { key });
        }

        info!(job = %name, key = %key, "Process Server Start: {}", name);
        let (stop_refresh, refresh_handle) = self.spawn_refresh(name, &key);
        self.stats.process_started();

        self.run_body(&definition, job, shutdown.as_mut()).await;

        self.stats.process_stopped();
        let _ = stop_refresh.send(());
        if let Err(e) = refresh_handle.await {
            warn!(job = %name, "锁续期任务异常退出: {}", e);
        }
        if let Err(e) = self.lock.release(&key).await {
            warn!(job = %name, key = %key, "释放进程锁失败: {}", e);
        }
        info!(job = %name, "Process Server Exit: {}", name);
        Ok(())
    }

    async fn run_body<S>(
        &self,
        definition: &ProcessJobDefinition,
        job: Arc<dyn ProcessJob>,
        mut shutdown: std::pin::Pin<&mut S>,
    ) where
        S: Future<Output = ()> + Send,
    {
        let name = definition.name.as_str();
        loop {
            info!(job = %name, "Process Job Process: {}", name);
            let outcome = tokio::select! {
                result = run_guarded(job.run()) => Some(result),
                _ = &mut shutdown => None,
            };
            match outcome {
                Some(Ok(())) => info!(job = %name, "Process Job Finish: {}", name),
                Some(Err(e)) => {
                    self.stats.record_process_failed(name);
                    error!(job = %name, "Process Job Failed: {}, exception: {}", name, e);
                }
                None => {
                    info!(job = %name, "收到关闭信号，停止进程作业");
                    return;
                }
            }

            if !definition.restart {
                return;
            }

            let delay = Duration::from_secs(definition.restart_delay_seconds);
            info!(job = %name, "{} 秒后重启进程作业", definition.restart_delay_seconds);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = &mut shutdown => return,
            }
            self.stats.record_process_restart(name);
        }
    }

    /// 阻塞式获取锁，每隔固定间隔重试，总等待超过上限后放弃
    async fn acquire_with_retry(&self, key: &str) -> SchedulerResult<bool> {
        let deadline = Instant::now() + self.settings.acquire_timeout;
        loop {
            if self.lock.acquire(key, self.settings.lock_ttl).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            debug!(key, "进程锁被占用，{:?} 后重试", self.settings.acquire_retry_interval);
            sleep(self.settings.acquire_retry_interval.min(deadline - now)).await;
        }
    }

    fn spawn_refresh(&self, name: &str, key: &str) -> (oneshot::Sender<()>, JoinHandle<()>) {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let lock = Arc::clone(&self.lock);
        let ttl = self.settings.lock_ttl;
        let every = self.settings.refresh_interval;
        let name = name.to_string();
        let key = key.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => match lock.refresh(&key, ttl).await {
                        Ok(()) => debug!(job = %name, key = %key, "进程锁已续期"),
                        Err(SchedulerError::LockLost { .. }) => {
                            error!(job = %name, key = %key, "进程锁已被其他实例持有，停止续期");
                            break;
                        }
                        Err(e) => warn!(job = %name, key = %key, "进程锁续期失败，下个周期重试: {}", e),
                    },
                    _ = &mut stop_rx => break,
                }
            }
        });
        (stop_tx, handle)
    }
}
