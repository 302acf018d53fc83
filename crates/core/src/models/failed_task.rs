use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TaskMessage;
use crate::{Result, SchedulerError};

/// 失败任务记录
///
/// 仅当任务处理器抛出未恢复的错误时创建；`attempt` 从 0 开始，每次人工重试后加一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub id: Uuid,
    pub task: String,
    pub payload: Option<String>,
    pub exception: String,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
}

impl FailedTask {
    pub fn new(task: impl Into<String>, payload: Option<String>, exception: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            task: task.into(),
            payload,
            exception: exception.into(),
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    pub fn from_message(message: &TaskMessage, exception: impl Into<String>) -> Self {
        Self::new(message.task.clone(), message.serialized_payload(), exception)
    }

    /// 还原原始任务消息，用于重新投递
    pub fn to_message(&self) -> Result<TaskMessage> {
        let payload = match &self.payload {
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                SchedulerError::Serialization(format!("失败任务 {} 的载荷无法解析: {e}", self.id))
            })?,
            None => serde_json::Value::Null,
        };
        Ok(TaskMessage::new(self.task.clone(), payload))
    }

    pub fn entity_description(&self) -> String {
        format!("失败任务 {} ({}), 已重试 {} 次", self.id, self.task, self.attempt)
    }
}
