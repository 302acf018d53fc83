use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use orchestrator_core::{
    traits::FailedTaskRepository, utils::run_guarded, FailedTask, JobRegistry, RuntimeStats,
    SchedulerError, SchedulerResult, TaskMessage,
};
use orchestrator_infrastructure::TaskReceiver;

/// 异步任务分发器
///
/// 每条消息按任务名找到处理器并在错误边界内执行；失败（包括处理器不存在）
/// 写入一条失败记录，成功不留任何痕迹。分发器自身从不重试。
pub struct TaskDispatcher {
    registry: Arc<JobRegistry>,
    repository: Arc<dyn FailedTaskRepository>,
    stats: Arc<RuntimeStats>,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<JobRegistry>,
        repository: Arc<dyn FailedTaskRepository>,
        stats: Arc<RuntimeStats>,
    ) -> Self {
        Self {
            registry,
            repository,
            stats,
        }
    }

    /// 处理一条任务消息，失败时返回新建失败记录的ID
    pub async fn handle(&self, message: TaskMessage) -> SchedulerResult<Option<Uuid>> {
        self.stats.task_received();
        debug!(task = %message.task, "Task Received: {}", message.task);

        let result = match self.registry.task_handler(&message.task) {
            Some(handler) => run_guarded(handler.handle(message.payload.clone())).await,
            None => Err(SchedulerError::HandlerNotFound {
                task: message.task.clone(),
            }),
        };

        match result {
            Ok(()) => {
                self.stats.task_finished(true);
                info!(task = %message.task, "Task Finish: {}", message.task);
                Ok(None)
            }
            Err(e) => {
                self.stats.task_finished(false);
                error!(task = %message.task, "Task Failed: {}, exception: {}", message.task, e);
                let record = FailedTask::from_message(&message, e.to_string());
                let id = self.repository.insert(&record).await?;
                Ok(Some(id))
            }
        }
    }

    /// 启动分发循环
    ///
    /// 每条消息作为独立任务并发处理。收到关闭信号后停止接收，
    /// 处理完已入队的消息并等待进行中的任务结束后退出。
    pub fn start(
        self: Arc<Self>,
        mut receiver: TaskReceiver,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("任务分发器已启动，已注册处理器: {:?}", self.registry.task_names());
            let mut in_flight = JoinSet::new();

            loop {
                tokio::select! {
                    message = receiver.recv() => match message {
                        Some(message) => {
                            in_flight.spawn(Arc::clone(&self).dispatch(message));
                        }
                        None => break,
                    },
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            warn!("任务执行单元异常退出: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("任务分发器收到关闭信号，停止接收新任务");
                        break;
                    }
                }
            }

            receiver.close();
            while let Some(message) = receiver.recv().await {
                in_flight.spawn(Arc::clone(&self).dispatch(message));
            }
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    warn!("任务执行单元异常退出: {}", e);
                }
            }
            info!("任务分发器已停止");
        })
    }

    async fn dispatch(self: Arc<Self>, message: TaskMessage) {
        let task = message.task.clone();
        if let Err(e) = self.handle(message).await {
            error!(task = %task, "失败任务记录写入失败: {}", e);
        }
    }
}
