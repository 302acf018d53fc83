use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use orchestrator_core::{SchedulerError, SchedulerResult, TaskMessage};

use crate::command::{ControlCommand, ControlResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// 控制通道客户端，供命令行工具使用
#[derive(Debug, Clone)]
pub struct ControlClient {
    address: String,
    request_timeout: Duration,
}

impl ControlClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> SchedulerResult<TcpStream> {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(SchedulerError::Protocol(format!(
                "无法连接控制通道 {}: {e}",
                self.address
            ))),
            Err(_) => Err(SchedulerError::Protocol(format!(
                "连接控制通道 {} 超时",
                self.address
            ))),
        }
    }

    /// 服务端是否在监听
    pub async fn is_running(&self) -> bool {
        self.connect().await.is_ok()
    }

    pub async fn send(&self, command: &ControlCommand) -> SchedulerResult<ControlResponse> {
        let request = command.encode()?;
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();

        let exchange = async {
            writer.write_all(request.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await?;
            Ok::<_, std::io::Error>(line)
        };

        let line = timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| SchedulerError::Protocol("控制请求超时".to_string()))?
            .map_err(|e| SchedulerError::Protocol(format!("控制请求失败: {e}")))?;
        if line.is_empty() {
            return Err(SchedulerError::Protocol("控制通道未返回响应".to_string()));
        }
        ControlResponse::decode(&line)
    }

    pub async fn shutdown(&self) -> SchedulerResult<bool> {
        self.expect_status(&ControlCommand::Shutdown).await
    }

    pub async fn retry_task(&self, message: TaskMessage) -> SchedulerResult<bool> {
        self.expect_status(&ControlCommand::TaskRetry(message)).await
    }

    pub async fn metrics(&self) -> SchedulerResult<Value> {
        match self.send(&ControlCommand::GetMetrics).await? {
            ControlResponse::Document(doc) => Ok(doc),
            ControlResponse::Error(message) => Err(SchedulerError::Protocol(message)),
            other => Err(SchedulerError::Protocol(format!(
                "getMetrics 返回了意外的响应: {}",
                other.encode()
            ))),
        }
    }

    async fn expect_status(&self, command: &ControlCommand) -> SchedulerResult<bool> {
        match self.send(command).await? {
            ControlResponse::Status(code) => Ok(code == 1),
            ControlResponse::Error(message) => Err(SchedulerError::Protocol(message)),
            ControlResponse::Document(_) => Err(SchedulerError::Protocol(
                "控制通道返回了意外的文档响应".to_string(),
            )),
        }
    }
}
