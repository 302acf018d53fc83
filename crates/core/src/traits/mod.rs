pub mod job;
pub mod lock;
pub mod repository;

pub use job::{handler_fn, job_fn, CronJob, FnHandler, FnJob, ProcessJob, TaskHandler};
pub use lock::LockCoordinator;
pub use repository::FailedTaskRepository;
