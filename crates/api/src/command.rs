use serde_json::{json, Value};

use orchestrator_core::{SchedulerError, SchedulerResult, TaskMessage};

const SEPARATOR: &str = "::";

pub const SHUTDOWN: &str = "shutdown";
pub const TASK_RETRY: &str = "taskRetry";
pub const GET_METRICS: &str = "getMetrics";

/// 控制通道命令，线上格式为 `COMMAND` 或 `COMMAND::ARG`
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Shutdown,
    TaskRetry(TaskMessage),
    GetMetrics,
    Unknown(String),
}

impl ControlCommand {
    pub fn parse(line: &str) -> SchedulerResult<Self> {
        let line = line.trim();
        let (name, arg) = match line.split_once(SEPARATOR) {
            Some((name, arg)) => (name, Some(arg)),
            None => (line, None),
        };

        match name {
            SHUTDOWN => Ok(ControlCommand::Shutdown),
            GET_METRICS => Ok(ControlCommand::GetMetrics),
            TASK_RETRY => {
                let arg = arg.filter(|a| !a.trim().is_empty()).ok_or_else(|| {
                    SchedulerError::Protocol("taskRetry 缺少任务消息参数".to_string())
                })?;
                let message: TaskMessage = serde_json::from_str(arg).map_err(|e| {
                    SchedulerError::Protocol(format!("taskRetry 参数不是合法的任务消息: {e}"))
                })?;
                Ok(ControlCommand::TaskRetry(message))
            }
            other => Ok(ControlCommand::Unknown(other.to_string())),
        }
    }

    /// 编码为不含换行的请求行
    pub fn encode(&self) -> SchedulerResult<String> {
        match self {
            ControlCommand::Shutdown => Ok(SHUTDOWN.to_string()),
            ControlCommand::GetMetrics => Ok(GET_METRICS.to_string()),
            ControlCommand::TaskRetry(message) => {
                let body = serde_json::to_string(message)?;
                Ok(format!("{TASK_RETRY}{SEPARATOR}{body}"))
            }
            ControlCommand::Unknown(name) => Ok(name.clone()),
        }
    }
}

/// 控制通道响应
#[derive(Debug, Clone, PartialEq)]
pub enum ControlResponse {
    /// `1` 表示成功，`0` 表示未知命令
    Status(i64),
    Document(Value),
    Error(String),
}

impl ControlResponse {
    pub fn ok() -> Self {
        ControlResponse::Status(1)
    }

    pub fn unknown() -> Self {
        ControlResponse::Status(0)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ControlResponse::Status(1))
    }

    pub fn encode(&self) -> String {
        match self {
            ControlResponse::Status(code) => code.to_string(),
            ControlResponse::Document(doc) => doc.to_string(),
            ControlResponse::Error(message) => json!({ "error": message }).to_string(),
        }
    }

    pub fn decode(line: &str) -> SchedulerResult<Self> {
        let line = line.trim();
        if let Ok(code) = line.parse::<i64>() {
            return Ok(ControlResponse::Status(code));
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| SchedulerError::Protocol(format!("无法解析控制响应 '{line}': {e}")))?;
        match value.as_object().and_then(|obj| {
            (obj.len() == 1)
                .then(|| obj.get("error").and_then(Value::as_str))
                .flatten()
        }) {
            Some(message) => Ok(ControlResponse::Error(message.to_string())),
            None => Ok(ControlResponse::Document(value)),
        }
    }
}
