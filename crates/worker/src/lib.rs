//! 常驻进程监督与异步任务分发

pub mod host;
pub mod shell;
pub mod supervisor;
pub mod task_dispatcher;

pub use host::{ProcessHandle, ProcessHost};
pub use shell::{ShellCommand, ShellJob, ShellTaskHandler, TASK_PAYLOAD_ENV};
pub use supervisor::{ProcessSupervisor, SupervisorSettings};
pub use task_dispatcher::TaskDispatcher;
