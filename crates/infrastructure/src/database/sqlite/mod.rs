pub mod sqlite_failed_task_repository;

pub use sqlite_failed_task_repository::SqliteFailedTaskRepository;
