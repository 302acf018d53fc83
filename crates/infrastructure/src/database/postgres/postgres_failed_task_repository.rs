use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use orchestrator_core::{
    models::FailedTask, traits::FailedTaskRepository, SchedulerError, SchedulerResult,
};

/// PostgreSQL失败任务仓储实现
pub struct PostgresFailedTaskRepository {
    pool: PgPool,
}

impl PostgresFailedTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        debug!("Running PostgreSQL failed_tasks migration");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS failed_tasks (
                id UUID PRIMARY KEY,
                task VARCHAR(255) NOT NULL,
                payload TEXT,
                exception TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_failed_tasks_created_at ON failed_tasks(created_at DESC)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_failed_task(row: &PgRow) -> SchedulerResult<FailedTask> {
        Ok(FailedTask {
            id: row.try_get("id")?,
            task: row.try_get("task")?,
            payload: row.try_get("payload")?,
            exception: row.try_get("exception")?,
            attempt: row.try_get("attempt")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl FailedTaskRepository for PostgresFailedTaskRepository {
    #[instrument(skip(self, record), fields(task = %record.task))]
    async fn insert(&self, record: &FailedTask) -> SchedulerResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO failed_tasks (id, task, payload, exception, attempt, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(&record.task)
        .bind(&record.payload)
        .bind(&record.exception)
        .bind(record.attempt)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        debug!("记录失败任务: {}", record.entity_description());
        Ok(record.id)
    }

    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<FailedTask>> {
        let row = sqlx::query("SELECT * FROM failed_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_failed_task).transpose()
    }

    async fn list(&self, limit: i64) -> SchedulerResult<Vec<FailedTask>> {
        let rows = sqlx::query("SELECT * FROM failed_tasks ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_failed_task).collect()
    }

    async fn update(&self, record: &FailedTask) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE failed_tasks
            SET task = $2, payload = $3, exception = $4, attempt = $5
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.task)
        .bind(&record.payload)
        .bind(&record.exception)
        .bind(record.attempt)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::FailedTaskNotFound {
                id: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM failed_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::FailedTaskNotFound { id: id.to_string() });
        }
        debug!("删除失败任务: {}", id);
        Ok(())
    }
}
