use std::sync::Arc;
use std::time::Duration;

use orchestrator_api::{ControlClient, ControlCommand, ControlHandler, ControlResponse, ControlServer};
use orchestrator_core::{
    config::ControlConfig, AppConfig, RuntimeStats, ShutdownManager, ShutdownReason, TaskMessage,
};
use orchestrator_infrastructure::{task_channel, TaskReceiver};
use serde_json::json;

struct Harness {
    client: ControlClient,
    receiver: TaskReceiver,
    shutdown: ShutdownManager,
    server: tokio::task::JoinHandle<()>,
}

async fn start() -> anyhow::Result<Harness> {
    let config = ControlConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..ControlConfig::default()
    };
    let stats = Arc::new(RuntimeStats::new("node-a"));
    let (queue, receiver) = task_channel(8);
    let shutdown = ShutdownManager::new();
    let handler = Arc::new(ControlHandler::new(
        &AppConfig::default(),
        stats.clone(),
        queue,
        shutdown.clone(),
    ));

    let server = ControlServer::bind(&config, handler, stats).await?;
    let addr = server.local_addr()?;
    // 服务器订阅同一个关闭管理器，shutdown 命令会让它自己停止监听
    let server = tokio::spawn(server.serve(shutdown.subscribe()));

    Ok(Harness {
        client: ControlClient::new(addr.to_string()),
        receiver,
        shutdown,
        server,
    })
}

#[tokio::test]
async fn test_metrics_over_tcp() -> anyhow::Result<()> {
    let harness = start().await?;
    assert!(harness.client.is_running().await);

    let doc = harness.client.metrics().await?;
    assert!(doc.get("server").is_some());
    assert_eq!(doc["metrics"]["instance_id"], "node-a");
    // 本次请求自身的连接
    assert!(doc["metrics"]["accept_count"].as_u64().unwrap() >= 1);
    Ok(())
}

#[tokio::test]
async fn test_retry_reaches_queue() -> anyhow::Result<()> {
    let mut harness = start().await?;
    let message = TaskMessage::new("send_mail", json!({"to": "ops@example.com"}));
    assert!(harness.client.retry_task(message.clone()).await?);
    assert_eq!(harness.receiver.recv().await, Some(message));
    Ok(())
}

#[tokio::test]
async fn test_unknown_and_malformed_over_tcp() -> anyhow::Result<()> {
    let harness = start().await?;
    assert_eq!(
        harness
            .client
            .send(&ControlCommand::Unknown("frobnicate".into()))
            .await?,
        ControlResponse::Status(0)
    );
    assert!(matches!(
        harness
            .client
            .send(&ControlCommand::Unknown("taskRetry::{broken".into()))
            .await?,
        ControlResponse::Error(_)
    ));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_command_and_server_stop() -> anyhow::Result<()> {
    let harness = start().await?;
    assert!(harness.client.shutdown().await?);
    let reason = tokio::time::timeout(Duration::from_secs(1), harness.shutdown.wait()).await?;
    assert_eq!(reason, ShutdownReason::ControlCommand);

    tokio::time::timeout(Duration::from_secs(1), harness.server).await??;
    assert!(!harness.client.is_running().await);
    Ok(())
}

#[tokio::test]
async fn test_client_reports_unreachable_server() {
    let client = ControlClient::new("127.0.0.1:1");
    assert!(!client.is_running().await);
    assert!(client.metrics().await.is_err());
}
