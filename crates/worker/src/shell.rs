use std::process::Stdio;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use orchestrator_core::{
    config::CommandSpec,
    traits::{CronJob, ProcessJob, TaskHandler},
};

/// 任务处理器通过该环境变量接收 JSON 载荷
pub const TASK_PAYLOAD_ENV: &str = "TASK_PAYLOAD";

/// 配置中声明的外部命令
#[derive(Debug, Clone)]
pub struct ShellCommand {
    spec: CommandSpec,
}

impl ShellCommand {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// 执行命令并返回标准输出，非零退出码视为失败并携带标准错误
    pub async fn execute(&self, extra_env: &[(&str, String)]) -> anyhow::Result<String> {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.spec.env {
            cmd.env(key, value);
        }
        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        debug!(
            "执行命令: program={}, args={:?}",
            self.spec.program, self.spec.args
        );
        let output = cmd
            .output()
            .await
            .with_context(|| format!("启动命令 {} 失败", self.spec.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "命令 {} 执行失败，退出码: {:?}: {}",
                self.spec.program,
                output.status.code(),
                stderr.trim()
            ));
        }
        Ok(stdout)
    }
}

/// 以外部命令为作业体的定时/常驻作业
pub struct ShellJob {
    name: String,
    command: ShellCommand,
}

impl ShellJob {
    pub fn new(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command: ShellCommand::new(spec),
        }
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let output = self.command.execute(&[]).await?;
        if !output.is_empty() {
            info!(job = %self.name, "命令输出: {}", output);
        }
        Ok(())
    }
}

#[async_trait]
impl CronJob for ShellJob {
    async fn run(&self) -> anyhow::Result<()> {
        self.execute().await
    }
}

#[async_trait]
impl ProcessJob for ShellJob {
    async fn run(&self) -> anyhow::Result<()> {
        self.execute().await
    }
}

/// 以外部命令处理异步任务，载荷写入 `TASK_PAYLOAD`
pub struct ShellTaskHandler {
    name: String,
    command: ShellCommand,
}

impl ShellTaskHandler {
    pub fn new(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command: ShellCommand::new(spec),
        }
    }
}

#[async_trait]
impl TaskHandler for ShellTaskHandler {
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let output = self
            .command
            .execute(&[(TASK_PAYLOAD_ENV, payload.to_string())])
            .await?;
        if !output.is_empty() {
            debug!(task = %self.name, "命令输出: {}", output);
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let command = ShellCommand::new(sh("echo hello"));
        assert_eq!(command.execute(&[]).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let command = ShellCommand::new(sh("echo disk full >&2; exit 3"));
        let err = command.execute(&[]).await.unwrap_err().to_string();
        assert!(err.contains("Some(3)"));
        assert!(err.contains("disk full"));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let command = ShellCommand::new(CommandSpec {
            program: "/nonexistent/orchestrator-test-binary".to_string(),
            ..CommandSpec::default()
        });
        assert!(command.execute(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_configured_env_is_passed() {
        let mut spec = sh("test \"$GREETING\" = hi");
        spec.env.insert("GREETING".to_string(), "hi".to_string());
        assert!(ShellCommand::new(spec).execute(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_task_handler_receives_payload() {
        let handler = ShellTaskHandler::new(
            "check",
            sh(r#"test "$TASK_PAYLOAD" = '{"id":7}'"#),
        );
        handler.handle(serde_json::json!({"id": 7})).await.unwrap();
        assert!(handler.handle(serde_json::json!({"id": 8})).await.is_err());
    }
}
