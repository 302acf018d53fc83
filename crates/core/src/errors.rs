use thiserror::Error;

/// 编排器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("无效的调度表达式: {expr} - {message}")]
    InvalidSchedule { expr: String, message: String },

    #[error("锁已被占用: {key}")]
    LockUnavailable { key: String },

    #[error("锁已丢失: {key}")]
    LockLost { key: String },

    #[error("锁协调服务不可用: {0}")]
    CoordinatorUnavailable(String),

    #[error("作业执行错误: {0}")]
    JobExecution(String),

    #[error("作业未找到: {name}")]
    JobNotFound { name: String },

    #[error("任务处理器未注册: {task}")]
    HandlerNotFound { task: String },

    #[error("失败任务记录未找到: {id}")]
    FailedTaskNotFound { id: String },

    #[error("失败任务 {id} 已达到最大重试次数 {max}")]
    RetryLimitExceeded { id: String, max: u32 },

    #[error("控制协议错误: {0}")]
    Protocol(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 协调层错误会中止当前操作，其余错误在作业边界内消化
    pub fn is_coordination_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::CoordinatorUnavailable(_) | SchedulerError::LockLost { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
