pub mod postgres;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use orchestrator_core::{
    config::DatabaseConfig, traits::FailedTaskRepository, SchedulerResult,
};

pub use postgres::PostgresFailedTaskRepository;
pub use sqlite::SqliteFailedTaskRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else {
            DatabaseType::SQLite
        }
    }
}

/// 根据URL创建失败任务仓储并完成建表
pub async fn connect_failed_task_repository(
    config: &DatabaseConfig,
) -> SchedulerResult<Arc<dyn FailedTaskRepository>> {
    let acquire_timeout = Duration::from_secs(config.connection_timeout_seconds);
    let idle_timeout = Duration::from_secs(config.idle_timeout_seconds);

    match DatabaseType::from_url(&config.url) {
        DatabaseType::PostgreSQL => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .connect(&config.url)
                .await?;
            let repo = PostgresFailedTaskRepository::new(pool);
            repo.migrate().await?;
            info!("失败任务存储已连接: PostgreSQL");
            Ok(Arc::new(repo))
        }
        DatabaseType::SQLite => {
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .connect(&config.url)
                .await?;
            let repo = SqliteFailedTaskRepository::new(pool);
            repo.migrate().await?;
            info!("失败任务存储已连接: SQLite");
            Ok(Arc::new(repo))
        }
    }
}
