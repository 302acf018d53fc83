use std::time::Duration;

use orchestrator::{ShutdownManager, ShutdownReason};

#[tokio::test]
async fn test_shutdown_reaches_every_component() {
    let manager = ShutdownManager::new();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let mut rx = manager.subscribe();
        handles.push(tokio::spawn(async move { rx.recv().await.is_ok() }));
    }

    assert!(!manager.is_shutdown());
    assert!(manager.trigger(ShutdownReason::Signal));

    for handle in handles {
        let received = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(received);
    }
}

#[tokio::test]
async fn test_clones_share_state() {
    let manager = ShutdownManager::new();
    let clone = manager.clone();
    let mut rx = manager.subscribe();

    assert!(clone.trigger(ShutdownReason::ControlCommand));
    assert!(!manager.trigger(ShutdownReason::Signal));
    assert!(manager.is_shutdown());
    assert_eq!(manager.reason(), Some(ShutdownReason::ControlCommand));
    assert!(rx.recv().await.is_ok());
}
