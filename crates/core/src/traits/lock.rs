use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// 集群范围的互斥锁抽象
///
/// 同一个 key 在任意时刻最多只有一个持有者；持有者崩溃后锁在 TTL 到期时自动失效。
/// 后端不可达时返回 `CoordinatorUnavailable`，调用方必须中止当前操作。
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// 非阻塞地尝试获取锁，已被占用时返回 `Ok(false)`
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// 延长当前实例持有的锁，锁已不属于本实例时返回 `LockLost`
    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()>;

    /// 释放当前实例持有的锁，不属于本实例的锁保持不变
    async fn release(&self, key: &str) -> Result<()>;
}
