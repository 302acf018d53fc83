//! 定时作业调度
//!
//! 包含调度表达式解析（`cron_utils`）、间隔作业倒计时（`timer`）和定时调度器（`scheduler`）。

pub mod cron_utils;
pub mod scheduler;
pub mod timer;

pub use cron_utils::{NormalizedExpression, ScheduleResolver};
pub use scheduler::{CronJobStatus, CronScheduler, CronSchedulerSettings};
pub use timer::IntervalTimers;
