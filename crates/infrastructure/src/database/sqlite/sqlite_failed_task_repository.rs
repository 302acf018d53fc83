use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use orchestrator_core::{
    models::FailedTask, traits::FailedTaskRepository, SchedulerError, SchedulerResult,
};

/// SQLite失败任务仓储实现
pub struct SqliteFailedTaskRepository {
    pool: SqlitePool,
}

impl SqliteFailedTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建失败任务表
    pub async fn migrate(&self) -> SchedulerResult<()> {
        debug!("Running SQLite failed_tasks migration");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS failed_tasks (
                id TEXT PRIMARY KEY,
                task TEXT NOT NULL,
                payload TEXT,
                exception TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_failed_tasks_created_at ON failed_tasks(created_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_failed_task(row: &SqliteRow) -> SchedulerResult<FailedTask> {
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| SchedulerError::Serialization(format!("无效的失败任务ID {id}: {e}")))?;
        let created_at: String = row.try_get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| SchedulerError::Serialization(format!("无效的创建时间 {created_at}: {e}")))?
            .with_timezone(&Utc);

        Ok(FailedTask {
            id,
            task: row.try_get("task")?,
            payload: row.try_get("payload")?,
            exception: row.try_get("exception")?,
            attempt: row.try_get("attempt")?,
            created_at,
        })
    }
}

#[async_trait]
impl FailedTaskRepository for SqliteFailedTaskRepository {
    #[instrument(skip(self, record), fields(task = %record.task))]
    async fn insert(&self, record: &FailedTask) -> SchedulerResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO failed_tasks (id, task, payload, exception, attempt, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.task)
        .bind(&record.payload)
        .bind(&record.exception)
        .bind(record.attempt)
        .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        debug!("记录失败任务: {}", record.entity_description());
        Ok(record.id)
    }

    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<FailedTask>> {
        let row = sqlx::query("SELECT * FROM failed_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_failed_task).transpose()
    }

    async fn list(&self, limit: i64) -> SchedulerResult<Vec<FailedTask>> {
        let rows = sqlx::query("SELECT * FROM failed_tasks ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_failed_task).collect()
    }

    async fn update(&self, record: &FailedTask) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE failed_tasks
            SET task = ?, payload = ?, exception = ?, attempt = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.task)
        .bind(&record.payload)
        .bind(&record.exception)
        .bind(record.attempt)
        .bind(record.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::FailedTaskNotFound {
                id: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM failed_tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::FailedTaskNotFound { id: id.to_string() });
        }
        debug!("删除失败任务: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repository() -> SqliteFailedTaskRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteFailedTaskRepository::new(pool);
        repo.migrate().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = repository().await;
        let record = FailedTask::new("send_mail", Some(r#"{"to":"a@b.c"}"#.into()), "smtp down");

        let id = repo.insert(&record).await.unwrap();
        assert_eq!(id, record.id);

        let loaded = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.task, "send_mail");
        assert_eq!(loaded.payload.as_deref(), Some(r#"{"to":"a@b.c"}"#));
        assert_eq!(loaded.exception, "smtp down");
        assert_eq!(loaded.attempt, 0);

        assert!(repo.get_by_id(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_limit() {
        let repo = repository().await;
        for i in 0..3 {
            let mut record = FailedTask::new(format!("task-{i}"), None, "boom");
            record.created_at = Utc::now() + chrono::Duration::seconds(i);
            repo.insert(&record).await.unwrap();
        }

        let records = repo.list(2).await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(names, vec!["task-2", "task-1"]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repository().await;
        let mut record = FailedTask::new("t", None, "boom");
        repo.insert(&record).await.unwrap();

        record.attempt = 1;
        record.exception = "boom again".into();
        repo.update(&record).await.unwrap();
        let loaded = repo.get_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.attempt, 1);
        assert_eq!(loaded.exception, "boom again");

        repo.delete(record.id).await.unwrap();
        assert!(repo.get_by_id(record.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(record.id).await,
            Err(SchedulerError::FailedTaskNotFound { .. })
        ));
    }
}
