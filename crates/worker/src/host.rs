use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use orchestrator_core::{config::SupervisorMode, SchedulerError, SchedulerResult};

use crate::supervisor::ProcessSupervisor;

/// 进程作业执行上下文的句柄
pub enum ProcessHandle {
    /// 独立 OS 线程及其自有运行时
    Dedicated(std::thread::JoinHandle<()>),
    InProcess(tokio::task::JoinHandle<()>),
}

impl ProcessHandle {
    pub async fn join(self) {
        match self {
            ProcessHandle::Dedicated(handle) => {
                match tokio::task::spawn_blocking(move || handle.join()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => error!("进程作业线程异常退出"),
                    Err(e) => error!("等待进程作业线程失败: {}", e),
                }
            }
            ProcessHandle::InProcess(handle) => {
                if let Err(e) = handle.await {
                    error!("进程作业任务异常退出: {}", e);
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            ProcessHandle::Dedicated(handle) => handle.is_finished(),
            ProcessHandle::InProcess(handle) => handle.is_finished(),
        }
    }
}

/// 为每个启用的进程作业创建执行上下文
///
/// `Dedicated` 模式下每个作业运行在独立线程的独立运行时里，启动时拿不到锁即结束该线程；
/// `InProcess` 模式下作业是当前运行时的普通任务，拿不到锁只记录日志后返回。
/// 两种模式的锁和重启语义完全相同。
pub struct ProcessHost {
    supervisor: Arc<ProcessSupervisor>,
    mode: SupervisorMode,
}

impl ProcessHost {
    pub fn new(supervisor: Arc<ProcessSupervisor>, mode: SupervisorMode) -> Self {
        Self { supervisor, mode }
    }

    pub fn mode(&self) -> SupervisorMode {
        self.mode
    }

    /// 已注册且启用的作业名
    pub fn enabled_jobs(&self) -> Vec<String> {
        self.supervisor
            .registry()
            .process_jobs()
            .filter(|registered| registered.definition.enabled)
            .map(|registered| registered.definition.name.clone())
            .collect()
    }

    pub fn spawn(
        &self,
        name: &str,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<ProcessHandle> {
        match self.mode {
            SupervisorMode::Dedicated => self.spawn_dedicated(name, shutdown_rx),
            SupervisorMode::InProcess => Ok(self.spawn_in_process(name, shutdown_rx)),
        }
    }

    fn spawn_dedicated(
        &self,
        name: &str,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<ProcessHandle> {
        let supervisor = Arc::clone(&self.supervisor);
        let job_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("process-{name}"))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(job = %job_name, "创建进程作业运行时失败: {}", e);
                        return;
                    }
                };

                runtime.block_on(async {
                    let shutdown = async move {
                        let _ = shutdown_rx.recv().await;
                    };
                    match supervisor.run_until(&job_name, shutdown).await {
                        Ok(()) => info!(job = %job_name, "进程作业执行上下文退出"),
                        Err(e) => {
                            error!(job = %job_name, "进程作业启动失败，终止执行上下文: {}", e)
                        }
                    }
                });
            })
            .map_err(|e| SchedulerError::Internal(format!("创建进程作业线程 {name} 失败: {e}")))?;

        Ok(ProcessHandle::Dedicated(handle))
    }

    fn spawn_in_process(
        &self,
        name: &str,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> ProcessHandle {
        let supervisor = Arc::clone(&self.supervisor);
        let job_name = name.to_string();

        ProcessHandle::InProcess(tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
            };
            if let Err(e) = supervisor.run_until(&job_name, shutdown).await {
                warn!(job = %job_name, "进程作业未运行: {}", e);
            }
        }))
    }
}
