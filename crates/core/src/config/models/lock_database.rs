use serde::{Deserialize, Serialize};

/// 实例标识配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 未配置时使用主机名
    pub instance_id: Option<String>,
}

impl ServerConfig {
    pub fn resolve_instance_id(&self) -> String {
        if let Some(id) = self.instance_id.as_ref().filter(|id| !id.is_empty()) {
            return id.clone();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| format!("instance-{}", std::process::id()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    Redis,
    /// 仅在单实例部署或测试中使用，不提供跨实例互斥
    Memory,
}

/// 屏蔽URL中的密码，`user:secret@host` 变为 `user:***@host`
///
/// 没有 `scheme://` 或没有密码的URL原样返回。
pub fn mask_url_credentials(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let rest = &url[scheme_end..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let Some(at) = rest[..authority_end].rfind('@') else {
        return url.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!("{}{}:***{}", &url[..scheme_end], &rest[..colon], &rest[at..]),
        None => url.to_string(),
    }
}

/// 分布式锁配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "orchestrator".to_string(),
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == LockBackend::Redis
            && !self.redis_url.starts_with("redis://")
            && !self.redis_url.starts_with("rediss://")
        {
            return Err(anyhow::anyhow!("Redis URL格式无效: {}", self.redis_url));
        }
        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("锁键前缀不能为空"));
        }
        Ok(())
    }
}

/// 失败任务存储的数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://orchestrator.db?mode=rwc".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }

        if !self.is_sqlite()
            && !self.url.starts_with("postgresql://")
            && !self.url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!("数据库URL必须是SQLite或PostgreSQL格式"));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("最小连接数不能大于最大连接数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }
}
