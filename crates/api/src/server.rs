use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use orchestrator_core::{config::ControlConfig, RuntimeStats, SchedulerError, SchedulerResult};

use crate::handler::ControlHandler;

/// 本地控制通道 TCP 服务
pub struct ControlServer {
    listener: TcpListener,
    handler: Arc<ControlHandler>,
    stats: Arc<RuntimeStats>,
    request_timeout: Duration,
}

impl ControlServer {
    pub async fn bind(
        config: &ControlConfig,
        handler: Arc<ControlHandler>,
        stats: Arc<RuntimeStats>,
    ) -> SchedulerResult<Self> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            SchedulerError::Configuration(format!(
                "无法绑定控制通道地址 {}: {e}",
                config.bind_address
            ))
        })?;
        Ok(Self {
            listener,
            handler,
            stats,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    pub fn local_addr(&self) -> SchedulerResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SchedulerError::Internal(format!("无法获取控制通道地址: {e}")))
    }

    /// 接受连接直到收到关闭信号
    pub async fn serve(self, mut shutdown_rx: broadcast::Receiver<()>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("控制通道监听于 {}", addr);
        }
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("控制连接: {}", peer);
                        let handler = Arc::clone(&self.handler);
                        let stats = Arc::clone(&self.stats);
                        let timeout = self.request_timeout;
                        tokio::spawn(async move {
                            stats.control_connection_opened();
                            if let Err(e) = serve_connection(stream, handler, timeout).await {
                                debug!("控制连接 {} 异常结束: {}", peer, e);
                            }
                            stats.control_connection_closed();
                        });
                    }
                    Err(e) => error!("接受控制连接失败: {}", e),
                },
                _ = shutdown_rx.recv() => {
                    info!("控制通道收到关闭信号，停止监听");
                    break;
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<ControlHandler>,
    timeout: Duration,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match tokio::time::timeout(timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!("控制连接空闲超时，关闭连接");
                return Ok(());
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handler.handle_line(&line).await;
        writer.write_all(response.encode().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
}
