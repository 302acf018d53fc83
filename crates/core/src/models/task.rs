use serde::{Deserialize, Serialize};

/// 投递给任务分发器的消息
///
/// `task` 对应注册的处理器标识，`payload` 原样交给处理器。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    #[serde(alias = "taskId")]
    pub task: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskMessage {
    pub fn new(task: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task: task.into(),
            payload,
        }
    }

    /// 载荷的序列化形式，无法序列化时返回 None
    pub fn serialized_payload(&self) -> Option<String> {
        if self.payload.is_null() {
            return None;
        }
        serde_json::to_string(&self.payload).ok()
    }
}
