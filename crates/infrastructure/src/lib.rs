//! 外部资源适配：分布式锁、失败任务存储和进程内任务队列

pub mod database;
pub mod in_memory_queue;
pub mod lock;

pub use database::{
    connect_failed_task_repository, DatabaseType, PostgresFailedTaskRepository,
    SqliteFailedTaskRepository,
};
pub use in_memory_queue::{task_channel, TaskQueue, TaskReceiver};
pub use lock::{InMemoryLockCoordinator, InMemoryLockStore, RedisLockCoordinator};
