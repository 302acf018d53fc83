use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use orchestrator_api::ControlClient;
use orchestrator_core::{
    traits::FailedTaskRepository, FailedTask, SchedulerError, SchedulerResult,
};

/// 人工重试一条失败任务
///
/// 读取记录，超过重试上限时拒绝；通过控制通道重新投递后把重试次数加一。
/// 投递失败时记录保持不变。
pub async fn retry_failed_task(
    repository: &Arc<dyn FailedTaskRepository>,
    client: &ControlClient,
    id: Uuid,
    max_retry_attempts: Option<u32>,
) -> SchedulerResult<FailedTask> {
    let mut record = repository
        .get_by_id(id)
        .await?
        .ok_or_else(|| SchedulerError::FailedTaskNotFound { id: id.to_string() })?;

    if let Some(max) = max_retry_attempts {
        if record.attempt >= max as i32 {
            return Err(SchedulerError::RetryLimitExceeded {
                id: id.to_string(),
                max,
            });
        }
    }

    let message = record.to_message()?;
    if !client.retry_task(message).await? {
        return Err(SchedulerError::Protocol(format!(
            "服务端拒绝重新投递任务 {}",
            record.task
        )));
    }

    record.attempt += 1;
    repository.update(&record).await?;
    info!(task = %record.task, "失败任务已重新投递: {}", record.entity_description());
    Ok(record)
}
