use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use orchestrator_core::{
    config::CronConfig,
    traits::{CronJob, LockCoordinator},
    utils::run_guarded,
    JobRegistry, RuntimeStats, Schedule,
};

use crate::cron_utils::{truncate_to_minute, ScheduleResolver};
use crate::timer::IntervalTimers;

/// 定时作业的展示信息，对应 `cron-list` 的一行
#[derive(Debug, Clone, Serialize)]
pub struct CronJobStatus {
    pub name: String,
    pub enabled: bool,
    pub time: String,
    pub next: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CronSchedulerSettings {
    pub tick_interval: Duration,
    pub timer_tick: Duration,
    pub lock_ttl: Duration,
    pub key_prefix: String,
}

impl CronSchedulerSettings {
    pub fn from_config(config: &CronConfig, key_prefix: &str) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_seconds),
            timer_tick: Duration::from_secs(config.timer_tick_seconds),
            lock_ttl: config.lock_ttl(),
            key_prefix: key_prefix.to_string(),
        }
    }
}

impl Default for CronSchedulerSettings {
    fn default() -> Self {
        Self::from_config(&CronConfig::default(), "orchestrator")
    }
}

/// 定时作业调度器
///
/// 每个 tick 评估所有启用作业的到期状态；到期作业先以非阻塞方式获取锁，
/// 获取成功后作为独立的 tokio 任务运行，结束后释放锁。tick 本身从不等待作业完成。
pub struct CronScheduler {
    registry: Arc<JobRegistry>,
    resolver: ScheduleResolver,
    lock: Arc<dyn LockCoordinator>,
    stats: Arc<RuntimeStats>,
    settings: CronSchedulerSettings,
    timers: Mutex<IntervalTimers>,
    last_evaluated_minute: Mutex<Option<DateTime<Utc>>>,
}

impl CronScheduler {
    pub fn new(
        registry: Arc<JobRegistry>,
        lock: Arc<dyn LockCoordinator>,
        stats: Arc<RuntimeStats>,
        settings: CronSchedulerSettings,
    ) -> Self {
        let timers = IntervalTimers::from_registry(&registry, Utc::now());
        Self {
            registry,
            resolver: ScheduleResolver::new(),
            lock,
            stats,
            settings,
            timers: Mutex::new(timers),
            last_evaluated_minute: Mutex::new(None),
        }
    }

    pub fn with_resolver(mut self, resolver: ScheduleResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn lock_key(&self, job_name: &str) -> String {
        format!("{}:cron:{}", self.settings.key_prefix, job_name)
    }

    /// 评估表达式型作业并启动到期的作业
    ///
    /// 同一分钟内重复调用不会再次触发。返回本次启动的作业句柄。
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let minute = truncate_to_minute(now);
        {
            let mut last = self
                .last_evaluated_minute
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *last == Some(minute) {
                debug!("分钟 {} 已评估过，跳过本次tick", minute);
                return Vec::new();
            }
            *last = Some(minute);
        }

        let mut launched = Vec::new();
        for registered in self.registry.cron_jobs() {
            let definition = &registered.definition;
            if !definition.enabled || definition.schedule.is_interval() {
                continue;
            }

            let evaluation = match self.resolver.evaluate(&definition.schedule, now) {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    warn!(job = %definition.name, "调度表达式无效，本次视为未到期: {}", e);
                    continue;
                }
            };
            if !evaluation.is_due {
                continue;
            }

            if let Some(handle) = self
                .launch(&definition.name, Arc::clone(&registered.job))
                .await
            {
                launched.push(handle);
            }
        }
        launched
    }

    /// 推进间隔型作业的倒计时并启动到期的作业
    pub async fn tick_timers(
        &self,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> Vec<JoinHandle<()>> {
        let fired: Vec<(String, Option<DateTime<Utc>>)> = {
            let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
            let names = timers.advance(elapsed.as_secs(), now);
            names
                .into_iter()
                .map(|name| {
                    let next = timers.next_run(&name);
                    (name, next)
                })
                .collect()
        };

        let mut launched = Vec::new();
        for (name, next) in fired {
            let Some(registered) = self.registry.cron_job(&name) else {
                continue;
            };
            if let Some(next) = next {
                debug!(job = %name, "间隔作业到期，本实例下次计划于 {}", next);
            }
            if let Some(handle) = self.launch(&name, Arc::clone(&registered.job)).await {
                launched.push(handle);
            }
        }
        launched
    }

    /// 获取锁并在独立任务中运行作业，锁被占用或协调服务不可用时返回 None
    async fn launch(&self, name: &str, job: Arc<dyn CronJob>) -> Option<JoinHandle<()>> {
        let key = self.lock_key(name);
        match self.lock.acquire(&key, self.settings.lock_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(job = %name, key = %key, "锁已被其他实例持有，跳过本次执行");
                self.stats.record_cron_skipped(name);
                return None;
            }
            Err(e) => {
                error!(job = %name, key = %key, "获取定时作业锁失败: {}", e);
                return None;
            }
        }

        let name = name.to_string();
        let lock = Arc::clone(&self.lock);
        let stats = Arc::clone(&self.stats);
        Some(tokio::spawn(async move {
            stats.record_cron_started(&name);
            info!(job = %name, "Cron Job Process: {}", name);
            match run_guarded(job.run()).await {
                Ok(()) => info!(job = %name, "Cron Job Finish: {}", name),
                Err(e) => {
                    stats.record_cron_failed(&name);
                    error!(job = %name, "Cron Job Failed: {}, exception: {}", name, e);
                }
            }
            if let Err(e) = lock.release(&key).await {
                warn!(job = %name, key = %key, "释放定时作业锁失败: {}", e);
            }
        }))
    }

    /// 列出所有定时作业及其下一次执行时间
    ///
    /// 间隔作业由各实例自己的倒计时驱动，没有统一的下一次执行时间，`next` 为空。
    pub fn list(&self, now: DateTime<Utc>) -> Vec<CronJobStatus> {
        self.registry
            .cron_jobs()
            .map(|registered| {
                let definition = &registered.definition;
                let (next, error) = match &definition.schedule {
                    Schedule::Interval(_) => (None, None),
                    schedule => match self.resolver.evaluate(schedule, now) {
                        Ok(evaluation) => (evaluation.next, None),
                        Err(e) => (None, Some(e.to_string())),
                    },
                };
                CronJobStatus {
                    name: definition.name.clone(),
                    enabled: definition.enabled,
                    time: definition.schedule.to_string(),
                    next,
                    error,
                }
            })
            .collect()
    }

    /// 启动调度循环
    ///
    /// 收到关闭信号后不再启动新的执行，等待进行中的作业运行结束（锁随之释放）后退出。
    pub fn start(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let until_next_minute = {
                let now = Utc::now();
                let next_minute = truncate_to_minute(now) + chrono::Duration::minutes(1);
                (next_minute - now).to_std().unwrap_or_default()
            };
            let mut cron_tick = interval_at(
                Instant::now() + until_next_minute,
                self.settings.tick_interval,
            );
            cron_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut timer_tick = interval(self.settings.timer_tick);
            timer_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即完成，不计入倒计时
            timer_tick.tick().await;

            let has_timers = {
                let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
                !timers.is_empty()
            };
            info!(
                "定时调度器已启动: {} 个作业, 其中 {} 个间隔作业",
                self.registry.cron_jobs().count(),
                self.timers.lock().map(|t| t.len()).unwrap_or(0)
            );

            let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
            loop {
                tokio::select! {
                    _ = cron_tick.tick() => {
                        in_flight.extend(self.tick(Utc::now()).await);
                    }
                    _ = timer_tick.tick(), if has_timers => {
                        in_flight.extend(self.tick_timers(self.settings.timer_tick, Utc::now()).await);
                    }
                    _ = shutdown_rx.recv() => {
                        info!("定时调度器收到关闭信号，停止调度");
                        break;
                    }
                }
                in_flight.retain(|handle| !handle.is_finished());
            }

            in_flight.retain(|handle| !handle.is_finished());
            if !in_flight.is_empty() {
                info!("等待 {} 个进行中的定时作业结束", in_flight.len());
            }
            for handle in in_flight {
                if let Err(e) = handle.await {
                    warn!("定时作业执行单元异常退出: {}", e);
                }
            }
            info!("定时调度器已停止");
        })
    }
}
