//! # Orchestrator
//!
//! 集群后台作业编排：按调度表达式运行的定时作业、需要集群内单实例常驻的进程作业，
//! 以及通过进程内队列分发的异步任务。跨实例互斥通过分布式锁实现。

pub mod app;
pub mod failed_tasks;
pub mod jobs;

pub use app::{connect_lock, Application};
pub use failed_tasks::retry_failed_task;
pub use jobs::{list_cron_jobs, register_configured_jobs, registry_from_config};
pub use orchestrator_core::{ShutdownManager, ShutdownReason};
