pub mod postgres_failed_task_repository;

pub use postgres_failed_task_repository::PostgresFailedTaskRepository;
