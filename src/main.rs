use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use orchestrator::{registry_from_config, Application, ShutdownManager, ShutdownReason};
use orchestrator_core::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("orchestrator")
        .version("1.0.0")
        .about("集群后台作业编排服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认位置查找"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);

    // 加载配置
    let config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认位置>")))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.clone());

    // 初始化日志系统
    init_logging(&log_level, &log_format)?;

    info!("启动作业编排服务，实例: {}", config.instance_id());
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let registry = registry_from_config(&config).context("构建作业注册表失败")?;
    let app = Application::new(config, registry).await?;

    // 信号、控制通道和应用失败共用同一个关闭管理器
    let shutdown = ShutdownManager::new();

    // 启动应用
    let mut app_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = app.run(shutdown.clone()).await;
            if let Err(e) = &result {
                error!("应用运行失败: {e:#}");
                shutdown.trigger(ShutdownReason::ComponentFailure);
            }
            result
        })
    };

    // 等待关闭信号
    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            shutdown.trigger(ShutdownReason::Signal);
        }
        reason = shutdown.wait() => {
            info!("关闭请求来源: {reason}");
        }
    }

    info!("开始优雅关闭...");

    // 等待应用关闭，设置超时
    let exit = match tokio::time::timeout(Duration::from_secs(30), &mut app_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("应用已优雅关闭");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(e)) => {
            error!("应用关闭时发生错误: {e}");
            Ok(())
        }
        Err(_) => {
            warn!("应用关闭超时，强制退出");
            app_handle.abort();
            Ok(())
        }
    };

    info!("作业编排服务已退出");
    exit
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
