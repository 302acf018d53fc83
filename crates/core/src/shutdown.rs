use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

/// 关闭的触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 进程收到 SIGINT / SIGTERM
    Signal,
    /// 控制通道收到 `shutdown` 命令
    ControlCommand,
    /// 应用启动或运行失败
    ComponentFailure,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownReason::Signal => "系统信号",
            ShutdownReason::ControlCommand => "控制通道命令",
            ShutdownReason::ComponentFailure => "组件失败",
        };
        f.write_str(text)
    }
}

/// 进程内唯一的关闭触发点
///
/// 信号处理、控制通道和应用自身都通过 [`ShutdownManager::trigger`] 请求关闭，
/// 只有第一次请求生效并记录来源。各组件通过 [`ShutdownManager::subscribe`]
/// 获得广播接收器，关闭之后再订阅的接收器会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    inner: Arc<Inner>,
}

struct Inner {
    signal: broadcast::Sender<()>,
    state: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (signal, _) = broadcast::channel(1);
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner { signal, state }),
        }
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        // 先订阅再检查状态：trigger 先写状态后广播，两者之间订阅的接收器不会漏掉信号
        let receiver = self.inner.signal.subscribe();
        if !self.is_shutdown() {
            return receiver;
        }
        let (tx, fired) = broadcast::channel(1);
        let _ = tx.send(());
        fired
    }

    /// 请求关闭，返回本次调用是否是第一次触发
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.inner.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(reason);
            true
        });
        if !first {
            debug!("关闭已经触发过，忽略来自{}的请求", reason);
            return false;
        }

        info!("触发系统关闭，来源: {}", reason);
        // 没有订阅者时发送失败，忽略
        let _ = self.inner.signal.send(());
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// 第一次触发关闭的来源
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.inner.state.borrow()
    }

    /// 等待关闭被触发，返回触发来源
    pub async fn wait(&self) -> ShutdownReason {
        let mut state = self.inner.state.subscribe();
        loop {
            if let Some(reason) = *state.borrow_and_update() {
                return reason;
            }
            // 发送端由 self 持有，不会关闭
            let _ = state.changed().await;
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscribers_receive_signal() {
        let manager = ShutdownManager::new();
        let mut a = manager.subscribe();
        let mut b = manager.subscribe();

        assert!(manager.trigger(ShutdownReason::Signal));
        assert!(manager.is_shutdown());
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_first_reason_wins() {
        let manager = ShutdownManager::new();
        assert_eq!(manager.reason(), None);

        assert!(manager.trigger(ShutdownReason::ControlCommand));
        assert!(!manager.trigger(ShutdownReason::Signal));
        assert_eq!(manager.reason(), Some(ShutdownReason::ControlCommand));
    }

    #[tokio::test]
    async fn test_late_subscriber_fires_immediately() {
        let manager = ShutdownManager::new();
        manager.trigger(ShutdownReason::Signal);

        let mut late = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_resolves_on_trigger_from_clone() {
        let manager = ShutdownManager::new();
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        manager.clone().trigger(ShutdownReason::ComponentFailure);
        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, ShutdownReason::ComponentFailure);

        // 已经触发之后立即返回
        assert_eq!(manager.wait().await, ShutdownReason::ComponentFailure);
    }
}
