pub mod failed_task;
pub mod job;
pub mod task;

pub use failed_task::FailedTask;
pub use job::{CronEvaluation, CronJobDefinition, ProcessJobDefinition, Schedule};
pub use task::TaskMessage;
