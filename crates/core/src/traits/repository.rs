use async_trait::async_trait;
use uuid::Uuid;

use crate::{models::FailedTask, Result};

/// 失败任务存储
///
/// 各实例并发插入互不影响，不需要额外加锁。
#[async_trait]
pub trait FailedTaskRepository: Send + Sync {
    async fn insert(&self, record: &FailedTask) -> Result<Uuid>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<FailedTask>>;
    /// 按创建时间倒序返回最近的记录
    async fn list(&self, limit: i64) -> Result<Vec<FailedTask>>;
    async fn update(&self, record: &FailedTask) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}
