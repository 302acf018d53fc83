pub mod config;
pub mod errors;
pub mod models;
pub mod registry;
pub mod shutdown;
pub mod stats;
pub mod traits;
pub mod utils;

pub use config::AppConfig;
pub use errors::*;
pub use models::{
    CronEvaluation, CronJobDefinition, FailedTask, ProcessJobDefinition, Schedule, TaskMessage,
};
pub use registry::{JobRegistry, JobRegistryBuilder, RegisteredCronJob, RegisteredProcessJob};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use stats::{RuntimeStats, RuntimeStatsSnapshot};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
