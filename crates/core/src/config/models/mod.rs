pub mod app_config;
pub mod jobs;
pub mod lock_database;
pub mod control_observability;

pub use app_config::AppConfig;
pub use control_observability::{ControlConfig, ObservabilityConfig};
pub use jobs::{
    CommandSpec, CronConfig, CronJobConfig, ProcessConfig, ProcessJobConfig, SupervisorMode,
    TaskConfig, TaskHandlerConfig,
};
pub use lock_database::{
    mask_url_credentials, DatabaseConfig, LockBackend, LockConfig, ServerConfig,
};
