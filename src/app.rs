use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use orchestrator_api::{ControlHandler, ControlServer};
use orchestrator_core::{
    config::{mask_url_credentials, LockBackend},
    traits::{FailedTaskRepository, LockCoordinator},
    AppConfig, JobRegistry, RuntimeStats, SchedulerResult, ShutdownManager,
};
use orchestrator_dispatcher::{CronScheduler, CronSchedulerSettings};
use orchestrator_infrastructure::{
    connect_failed_task_repository, task_channel, InMemoryLockCoordinator, RedisLockCoordinator,
    TaskQueue, TaskReceiver,
};
use orchestrator_worker::{
    ProcessHandle, ProcessHost, ProcessSupervisor, SupervisorSettings, TaskDispatcher,
};

/// 主应用程序
///
/// 持有共享资源（锁协调器、失败任务存储、任务队列和运行统计），
/// 按配置启动定时调度器、任务分发器、进程作业和控制通道。
pub struct Application {
    config: AppConfig,
    registry: Arc<JobRegistry>,
    lock: Arc<dyn LockCoordinator>,
    repository: Arc<dyn FailedTaskRepository>,
    stats: Arc<RuntimeStats>,
    queue: TaskQueue,
    receiver: TaskReceiver,
}

impl Application {
    /// 创建新的应用实例，连接锁服务和失败任务存储
    pub async fn new(config: AppConfig, registry: JobRegistry) -> Result<Self> {
        let lock = connect_lock(&config).await.context("连接分布式锁服务失败")?;
        let repository = connect_failed_task_repository(&config.database)
            .await
            .context("连接失败任务存储失败")?;
        Ok(Self::with_components(config, registry, lock, repository))
    }

    pub fn with_components(
        config: AppConfig,
        registry: JobRegistry,
        lock: Arc<dyn LockCoordinator>,
        repository: Arc<dyn FailedTaskRepository>,
    ) -> Self {
        let (queue, receiver) = task_channel(config.task.queue_capacity);
        let stats = Arc::new(RuntimeStats::new(config.instance_id()));
        Self {
            config,
            registry: Arc::new(registry),
            lock,
            repository,
            stats,
            queue,
            receiver,
        }
    }

    pub fn task_queue(&self) -> TaskQueue {
        self.queue.clone()
    }

    pub fn stats(&self) -> Arc<RuntimeStats> {
        Arc::clone(&self.stats)
    }

    pub fn repository(&self) -> Arc<dyn FailedTaskRepository> {
        Arc::clone(&self.repository)
    }

    /// 运行应用程序，直到关闭被触发并且所有组件退出
    ///
    /// 关闭可以来自调用方持有的 `shutdown` 克隆，也可以来自控制通道的 `shutdown` 命令。
    pub async fn run(self, shutdown: ShutdownManager) -> Result<()> {
        let Self {
            config,
            registry,
            lock,
            repository,
            stats,
            queue,
            receiver,
        } = self;
        info!("启动应用程序，实例: {}", stats.instance_id());

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        // 先绑定控制通道，地址冲突时不启动其他组件
        if config.control.enabled {
            let handler = Arc::new(ControlHandler::new(
                &config,
                Arc::clone(&stats),
                queue.clone(),
                shutdown.clone(),
            ));
            let server = ControlServer::bind(&config.control, handler, Arc::clone(&stats))
                .await
                .context("启动控制通道失败")?;
            let shutdown_rx = shutdown.subscribe();
            handles.push(("control", tokio::spawn(server.serve(shutdown_rx))));
        }

        if config.cron.enabled {
            let scheduler = Arc::new(CronScheduler::new(
                Arc::clone(&registry),
                Arc::clone(&lock),
                Arc::clone(&stats),
                CronSchedulerSettings::from_config(&config.cron, &config.lock.key_prefix),
            ));
            let shutdown_rx = shutdown.subscribe();
            handles.push(("cron", scheduler.start(shutdown_rx)));
        }

        if config.task.enabled {
            let dispatcher = Arc::new(TaskDispatcher::new(
                Arc::clone(&registry),
                repository,
                Arc::clone(&stats),
            ));
            let shutdown_rx = shutdown.subscribe();
            handles.push(("task", dispatcher.start(receiver, shutdown_rx)));
        } else {
            drop(receiver);
        }

        let mut processes: Vec<(String, ProcessHandle)> = Vec::new();
        if config.process.enabled {
            let supervisor = Arc::new(ProcessSupervisor::new(
                Arc::clone(&registry),
                Arc::clone(&lock),
                Arc::clone(&stats),
                SupervisorSettings::from_config(&config.process, &config.lock.key_prefix),
            ));
            let host = ProcessHost::new(supervisor, config.process.mode);
            for name in host.enabled_jobs() {
                let shutdown_rx = shutdown.subscribe();
                match host.spawn(&name, shutdown_rx) {
                    Ok(handle) => processes.push((name, handle)),
                    Err(e) => error!(job = %name, "启动进程作业失败: {}", e),
                }
            }
            info!("已启动 {} 个进程作业，模式: {:?}", processes.len(), host.mode());
        }

        let reason = shutdown.wait().await;
        info!("应用程序收到关闭信号（{}），等待组件退出", reason);

        for (component, handle) in handles {
            if let Err(e) = handle.await {
                error!("组件 {} 异常退出: {}", component, e);
            }
        }
        for (name, handle) in processes {
            handle.join().await;
            info!(job = %name, "进程作业已停止");
        }

        let snapshot = stats.snapshot();
        info!(
            "所有组件已停止: 任务 {} 成功 / {} 失败",
            snapshot.tasks_succeeded, snapshot.tasks_failed
        );
        Ok(())
    }
}

/// 按配置选择锁协调器
pub async fn connect_lock(config: &AppConfig) -> SchedulerResult<Arc<dyn LockCoordinator>> {
    let instance_id = config.instance_id();
    match config.lock.backend {
        LockBackend::Redis => {
            let lock = RedisLockCoordinator::connect(&config.lock.redis_url, &instance_id).await?;
            info!("分布式锁使用 Redis: {}", mask_url_credentials(&config.lock.redis_url));
            Ok(Arc::new(lock))
        }
        LockBackend::Memory => {
            warn!("分布式锁使用进程内实现，多实例部署时不提供互斥");
            Ok(Arc::new(InMemoryLockCoordinator::new(instance_id)))
        }
    }
}
