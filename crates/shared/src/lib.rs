//! 共享库
//!
//! 包含所有二进制共用的分层配置加载与日志初始化。

pub mod config;
pub mod observability;
