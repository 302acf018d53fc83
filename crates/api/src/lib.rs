//! # Orchestrator Control
//!
//! 集群运维用的本地控制通道。协议基于 TCP，每个请求和响应各占一行：
//!
//! - `shutdown`：触发服务优雅关闭，响应 `1`
//! - `taskRetry::<json>`：把 JSON 解码为任务消息并重新投递到任务队列，响应 `1`
//! - `getMetrics`：响应包含 `server`（当前配置）和 `metrics`（运行统计）的 JSON 文档
//! - 其他命令响应 `0`
//!
//! 请求格式错误（如 `taskRetry` 的载荷不是合法 JSON）时响应 `{"error": "..."}`。
//!
//! ```text
//! orchestrator-cli ──TCP──▶ ControlServer ──▶ ControlHandler ──▶ TaskQueue / RuntimeStats
//! ```

pub mod client;
pub mod command;
pub mod handler;
pub mod server;

pub use client::ControlClient;
pub use command::{ControlCommand, ControlResponse};
pub use handler::ControlHandler;
pub use server::ControlServer;
