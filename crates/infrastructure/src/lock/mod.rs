pub mod memory;
pub mod redis_lock;

pub use memory::{InMemoryLockCoordinator, InMemoryLockStore};
pub use redis_lock::RedisLockCoordinator;

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER_SEQ: AtomicU64 = AtomicU64::new(1);

/// 生成锁持有者标识，同一进程内每个协调器实例唯一
pub fn owner_token(instance_id: &str) -> String {
    let seq = NEXT_OWNER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{instance_id}:{}:{seq}:{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    )
}
