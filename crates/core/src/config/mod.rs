//! 配置管理
//!
//! 加载顺序：内置默认值 → TOML 配置文件 → 环境变量（前缀 `ORCHESTRATOR_`，层级分隔符 `__`）。
//! 例如 `ORCHESTRATOR_CONTROL__BIND_ADDRESS=127.0.0.1:9600` 覆盖 `control.bind_address`。

pub mod models;

pub use models::*;
