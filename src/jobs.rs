use std::sync::Arc;

use chrono::Utc;

use orchestrator_core::{
    AppConfig, JobRegistry, JobRegistryBuilder, RuntimeStats, SchedulerResult,
};
use orchestrator_dispatcher::{CronJobStatus, CronScheduler, CronSchedulerSettings};
use orchestrator_infrastructure::InMemoryLockCoordinator;
use orchestrator_worker::{ShellJob, ShellTaskHandler};

/// 把配置文件中声明的命令型作业和任务处理器加入注册表
pub fn register_configured_jobs(
    mut builder: JobRegistryBuilder,
    config: &AppConfig,
) -> JobRegistryBuilder {
    for job in &config.cron.jobs {
        builder.add_cron(
            job.definition(),
            Arc::new(ShellJob::new(&job.name, job.command.clone())),
        );
    }
    for job in &config.process.jobs {
        builder.add_process(
            job.definition(),
            Arc::new(ShellJob::new(&job.name, job.command.clone())),
        );
    }
    for handler in &config.task.handlers {
        builder.add_task(
            &handler.name,
            Arc::new(ShellTaskHandler::new(&handler.name, handler.command.clone())),
        );
    }
    builder
}

/// 仅由配置构建的注册表
pub fn registry_from_config(config: &AppConfig) -> SchedulerResult<JobRegistry> {
    register_configured_jobs(JobRegistry::builder(), config).build()
}

/// 列出定时作业及下一次执行时间，不需要连接锁服务
pub fn list_cron_jobs(config: &AppConfig, registry: Arc<JobRegistry>) -> Vec<CronJobStatus> {
    let scheduler = CronScheduler::new(
        registry,
        Arc::new(InMemoryLockCoordinator::new("cron-list")),
        Arc::new(RuntimeStats::default()),
        CronSchedulerSettings::from_config(&config.cron, &config.lock.key_prefix),
    );
    scheduler.list(Utc::now())
}
