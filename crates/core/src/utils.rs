use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::{SchedulerError, SchedulerResult};

/// 在错误边界内执行作业体，错误和 panic 都转换为 `JobExecution`
pub async fn run_guarded<F>(body: F) -> SchedulerResult<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SchedulerError::JobExecution(format!("{e:#}"))),
        Err(panic) => Err(SchedulerError::JobExecution(format!(
            "panic: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
