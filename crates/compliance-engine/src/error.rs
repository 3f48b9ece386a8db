//! 规则引擎错误类型
//!
//! 条件级与节点级错误都会被就地捕获并写入诊断树，不会中断批量评估。
//! 结构定位（normalizer）没有错误类型：找不到列表时总是回退为单条目。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("未知的操作符: '{0}'")]
    UnknownOperator(String),

    #[error("类型不兼容: 操作符 {operator} 无法比较 {actual} 与 {expected}")]
    Comparison {
        operator: String,
        actual: String,
        expected: String,
    },

    #[error("无效的正则表达式 '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("无法解析日期时间: '{0}'")]
    InvalidDateTime(String),

    #[error("无效的操作数: {0}")]
    InvalidOperand(String),

    #[error("规则节点结构无法识别: {0}")]
    MalformedRuleNode(String),

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
