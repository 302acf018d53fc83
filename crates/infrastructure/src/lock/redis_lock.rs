use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue};
use tracing::{debug, warn};

use orchestrator_core::{traits::LockCoordinator, SchedulerError, SchedulerResult};

use super::owner_token;

const REFRESH_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
  return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("DEL", KEYS[1])
else
  return 0
end
"#;

/// 基于 Redis 的分布式锁
///
/// 获取使用 `SET key token NX PX ttl`，续期和释放通过 Lua 脚本先比对持有者标识，
/// 保证一个实例不会续期或删除其他实例持有的锁。
#[derive(Clone)]
pub struct RedisLockCoordinator {
    connection: ConnectionManager,
    owner_token: String,
}

impl RedisLockCoordinator {
    pub async fn connect(redis_url: &str, instance_id: &str) -> SchedulerResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            SchedulerError::Configuration(format!("Failed to create Redis client: {e}"))
        })?;
        let connection = ConnectionManager::new(client).await.map_err(|e| {
            SchedulerError::CoordinatorUnavailable(format!("Failed to connect to Redis: {e}"))
        })?;

        let coordinator = Self {
            connection,
            owner_token: owner_token(instance_id),
        };
        coordinator.ping().await?;
        debug!(owner = %coordinator.owner_token, "Successfully connected to Redis lock store");
        Ok(coordinator)
    }

    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }

    pub async fn ping(&self) -> SchedulerResult<()> {
        let response: String = self.query("PING", redis::cmd("PING")).await?;
        if response != "PONG" {
            return Err(SchedulerError::CoordinatorUnavailable(format!(
                "Unexpected PING response: {response}"
            )));
        }
        Ok(())
    }

    async fn query<T: FromRedisValue>(
        &self,
        operation: &'static str,
        cmd: redis::Cmd,
    ) -> SchedulerResult<T> {
        let mut conn = self.connection.clone();
        cmd.query_async(&mut conn).await.map_err(|e| {
            warn!(operation, "Redis command failed: {}", e);
            SchedulerError::CoordinatorUnavailable(format!("Redis command {operation} failed: {e}"))
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn acquire(&self, key: &str, ttl: Duration) -> SchedulerResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(&self.owner_token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl));
        let acquired: Option<String> = self.query("lock_acquire", cmd).await?;
        Ok(acquired.is_some())
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> SchedulerResult<()> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(REFRESH_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(&self.owner_token)
            .arg(ttl_millis(ttl));
        let refreshed: i64 = self.query("lock_refresh", cmd).await?;
        if refreshed == 1 {
            Ok(())
        } else {
            Err(SchedulerError::LockLost {
                key: key.to_string(),
            })
        }
    }

    async fn release(&self, key: &str) -> SchedulerResult<()> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(&self.owner_token);
        let released: i64 = self.query("lock_release", cmd).await?;
        if released == 0 {
            debug!(key, "锁已过期或不属于本实例，无需释放");
        }
        Ok(())
    }
}
