use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use orchestrator_core::{traits::LockCoordinator, SchedulerError, SchedulerResult};

#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// 进程内锁存储
///
/// 多个 `InMemoryLockCoordinator` 共享同一个存储即可模拟多个实例竞争同一把锁。
/// 过期判断使用 tokio 时钟，测试中可以配合 `tokio::time::pause()` 推进时间。
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    entries: Arc<Mutex<HashMap<String, LockEntry>>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的持有者
    pub fn holder(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.owner.clone())
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.holder(key).is_some()
    }

    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .and_then(|entry| entry.expires_at.checked_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }
}

/// 基于进程内存储的锁协调器，只在单实例部署和测试中使用
#[derive(Debug, Clone)]
pub struct InMemoryLockCoordinator {
    store: InMemoryLockStore,
    owner: String,
}

impl InMemoryLockCoordinator {
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_store(InMemoryLockStore::new(), owner)
    }

    pub fn with_store(store: InMemoryLockStore, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }

    pub fn store(&self) -> InMemoryLockStore {
        self.store.clone()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
impl LockCoordinator for InMemoryLockCoordinator {
    async fn acquire(&self, key: &str, ttl: Duration) -> SchedulerResult<bool> {
        let mut entries = self.store.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                debug!(key, holder = %entry.owner, "锁已被持有");
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            LockEntry {
                owner: self.owner.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> SchedulerResult<()> {
        let mut entries = self.store.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.owner == self.owner && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(())
            }
            _ => Err(SchedulerError::LockLost {
                key: key.to_string(),
            }),
        }
    }

    async fn release(&self, key: &str) -> SchedulerResult<()> {
        let mut entries = self.store.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).is_some_and(|entry| entry.owner == self.owner) {
            entries.remove(key);
        }
        Ok(())
    }
}
