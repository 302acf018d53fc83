use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use orchestrator::{list_cron_jobs, registry_from_config, retry_failed_task};
use orchestrator_api::ControlClient;
use orchestrator_core::{traits::FailedTaskRepository, AppConfig, FailedTask};
use orchestrator_infrastructure::connect_failed_task_repository;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化简单的日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = CliApp::parse();
    cli.run().await
}

/// CLI应用程序主结构
#[derive(clap::Parser, Debug)]
#[command(name = "orchestrator-cli")]
#[command(version = "1.0.0")]
#[command(about = "集群后台作业编排 - 命令行管理工具")]
#[command(long_about = "查看定时作业、通过控制通道管理运行中的服务、处理失败任务记录")]
struct CliApp {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径，未指定时按默认位置查找
    #[arg(short, long)]
    config: Option<String>,

    /// 控制通道地址，默认使用配置中的 control.bind_address
    #[arg(long)]
    address: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出定时作业及下一次执行时间
    CronList,
    /// 查看服务是否在运行
    Status,
    /// 请求服务优雅关闭
    Stop,
    /// 查看运行统计
    Metrics,
    /// 失败任务管理
    FailedTask(FailedTaskCommands),
    /// 配置管理
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
struct FailedTaskCommands {
    #[command(subcommand)]
    action: FailedTaskActions,
}

#[derive(Subcommand, Debug)]
enum FailedTaskActions {
    /// 列出失败任务
    List {
        /// 显示最近N条记录
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// 通过控制通道重新投递失败任务
    Retry {
        /// 失败任务ID
        id: Uuid,
    },
    /// 删除失败任务记录
    Delete {
        /// 失败任务ID
        id: Uuid,
        /// 强制删除 (不询问确认)
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct ConfigCommands {
    #[command(subcommand)]
    action: ConfigActions,
}

#[derive(Subcommand, Debug)]
enum ConfigActions {
    /// 显示当前配置
    Show,
    /// 验证配置文件
    Validate,
}

impl CliApp {
    fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    async fn run(self) -> Result<()> {
        let config = AppConfig::load(self.config.as_deref()).context("加载配置失败")?;
        let client = ControlClient::new(
            self.address
                .unwrap_or_else(|| config.control.bind_address.clone()),
        );

        match self.command {
            Commands::CronList => handle_cron_list(&config),
            Commands::Status => handle_status(&client).await,
            Commands::Stop => handle_stop(&client).await,
            Commands::Metrics => handle_metrics(&client).await,
            Commands::FailedTask(cmd) => handle_failed_task_commands(cmd, &config, &client).await,
            Commands::Config(cmd) => handle_config_commands(cmd, &config),
        }
    }
}

fn handle_cron_list(config: &AppConfig) -> Result<()> {
    let registry = Arc::new(registry_from_config(config)?);
    let jobs = list_cron_jobs(config, registry);

    println!("{:<24} {:<8} {:<20} {:<26}", "名称", "启用", "调度", "下次执行");
    println!("{}", "-".repeat(80));
    for job in jobs {
        let next = job
            .next
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{:<24} {:<8} {:<20} {:<26}",
            job.name,
            if job.enabled { "是" } else { "否" },
            job.time,
            next
        );
        if let Some(error) = job.error {
            println!("  ! {}", error);
        }
    }
    Ok(())
}

async fn handle_status(client: &ControlClient) -> Result<()> {
    if client.is_running().await {
        println!("✓ 服务正在运行: {}", client.address());
    } else {
        println!("✗ 服务未运行: {}", client.address());
    }
    Ok(())
}

async fn handle_stop(client: &ControlClient) -> Result<()> {
    if !client.is_running().await {
        println!("服务未运行: {}", client.address());
        return Ok(());
    }
    if client.shutdown().await? {
        println!("已请求服务关闭");
    } else {
        return Err(anyhow::anyhow!("服务拒绝关闭请求"));
    }
    Ok(())
}

async fn handle_metrics(client: &ControlClient) -> Result<()> {
    let document = client.metrics().await.context("获取运行统计失败")?;
    print_metrics(&document)?;
    Ok(())
}

// 失败任务命令处理
async fn handle_failed_task_commands(
    cmd: FailedTaskCommands,
    config: &AppConfig,
    client: &ControlClient,
) -> Result<()> {
    let repository = connect_failed_task_repository(&config.database)
        .await
        .context("连接失败任务存储失败")?;

    match cmd.action {
        FailedTaskActions::List { limit } => {
            let records = repository.list(limit).await?;
            print_failed_tasks_table(&records);
        }
        FailedTaskActions::Retry { id } => {
            let record =
                retry_failed_task(&repository, client, id, config.task.max_retry_attempts).await?;
            println!("任务已重新投递: {}", record.entity_description());
        }
        FailedTaskActions::Delete { id, force } => {
            delete_failed_task(&repository, id, force).await?;
        }
    }
    Ok(())
}

async fn delete_failed_task(
    repository: &Arc<dyn FailedTaskRepository>,
    id: Uuid,
    force: bool,
) -> Result<()> {
    if !force {
        println!("确定要删除失败任务 {} 吗? (y/N)", id);
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("已取消删除操作");
            return Ok(());
        }
    }
    repository.delete(id).await?;
    println!("失败任务删除成功: {}", id);
    Ok(())
}

// 配置命令处理
fn handle_config_commands(cmd: ConfigCommands, config: &AppConfig) -> Result<()> {
    match cmd.action {
        ConfigActions::Show => {
            println!("{}", config.to_toml()?);
        }
        ConfigActions::Validate => {
            let checked = config
                .validate()
                .and_then(|_| registry_from_config(config).map_err(anyhow::Error::from));
            match checked {
                Ok(registry) => {
                    println!("✓ 配置文件验证通过");
                    println!(
                        "  定时作业: {}, 进程作业: {}, 任务处理器: {}",
                        registry.cron_jobs().count(),
                        registry.process_jobs().count(),
                        registry.task_names().len()
                    );
                }
                Err(e) => return Err(e.context("✗ 配置文件验证失败")),
            }
        }
    }
    Ok(())
}

fn print_failed_tasks_table(records: &[FailedTask]) {
    println!("{:<36} {:<20} {:<6} {:<26} {}", "ID", "任务", "重试", "失败时间", "异常");
    println!("{}", "-".repeat(110));
    for record in records {
        println!(
            "{:<36} {:<20} {:<6} {:<26} {}",
            record.id,
            record.task,
            record.attempt,
            record.created_at.to_rfc3339(),
            record.exception.lines().next().unwrap_or("")
        );
    }
}

fn print_metrics(document: &Value) -> Result<()> {
    let metrics = &document["metrics"];
    println!("运行统计:");
    println!("  实例: {}", metrics["instance_id"].as_str().unwrap_or("N/A"));
    println!("  启动时间: {}", metrics["start_time"].as_str().unwrap_or("N/A"));
    println!("  运行时长: {} 秒", metrics["uptime_seconds"].as_i64().unwrap_or(0));
    println!(
        "  定时作业: 启动 {} / 失败 {} / 跳过 {}",
        metrics["cron_runs_started"].as_u64().unwrap_or(0),
        metrics["cron_runs_failed"].as_u64().unwrap_or(0),
        metrics["cron_runs_skipped"].as_u64().unwrap_or(0)
    );
    println!(
        "  进程作业: 运行中 {} / 失败 {} / 重启 {}",
        metrics["process_jobs_running"].as_i64().unwrap_or(0),
        metrics["process_runs_failed"].as_u64().unwrap_or(0),
        metrics["process_restarts"].as_u64().unwrap_or(0)
    );
    println!(
        "  任务: 接收 {} / 成功 {} / 失败 {} / 进行中 {} / 重新投递 {}",
        metrics["tasks_received"].as_u64().unwrap_or(0),
        metrics["tasks_succeeded"].as_u64().unwrap_or(0),
        metrics["tasks_failed"].as_u64().unwrap_or(0),
        metrics["tasks_in_flight"].as_i64().unwrap_or(0),
        metrics["tasks_resubmitted"].as_u64().unwrap_or(0)
    );
    println!(
        "  控制连接: 当前 {} / 累计 {}",
        metrics["connection_num"].as_i64().unwrap_or(0),
        metrics["accept_count"].as_u64().unwrap_or(0)
    );
    println!("服务配置:");
    println!("{}", serde_json::to_string_pretty(&document["server"])?);
    Ok(())
}
