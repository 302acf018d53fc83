use std::future::Future;

use async_trait::async_trait;

/// 定时作业的执行体
#[async_trait]
pub trait CronJob: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// 常驻进程作业的执行体，返回即视为本轮结束
#[async_trait]
pub trait ProcessJob: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// 异步任务处理器
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// 将无参闭包包装为作业
pub struct FnJob<F>(F);

pub fn job_fn<F, Fut>(f: F) -> FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnJob(f)
}

#[async_trait]
impl<F, Fut> CronJob for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

#[async_trait]
impl<F, Fut> ProcessJob for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

/// 将接收载荷的闭包包装为任务处理器
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        (self.0)(payload).await
    }
}
