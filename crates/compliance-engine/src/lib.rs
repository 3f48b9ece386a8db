//! 合规规则评估引擎
//!
//! 对任意结构的 JSON 规则集与记录集做批量合规检查，支持：
//! - 规则集/记录集的结构定位（包装键与启发式识别）
//! - 字段、操作符、取值键的动态识别与 100+ 操作符别名
//! - allOf / anyOf / not 组合与隐式相等条件
//! - 不短路的逐节点诊断树
//! - 确定性的并行批量评估与按记录汇总

pub mod batch;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod export;
pub mod labels;
pub mod models;
pub mod normalizer;
pub mod operators;
pub mod path;
pub mod report;

pub use batch::BatchEvaluator;
pub use compiler::RuleCompiler;
pub use config::EngineConfig;
pub use error::{Result, RuleError};
pub use executor::RuleExecutor;
pub use models::{
    Condition, EvaluationVerdict, NodeOutcome, RecordDocument, RuleDocument, RuleNode,
    SourceDocument,
};
pub use normalizer::DocumentRole;
pub use operators::{Operator, OperatorRegistry};
pub use report::{BatchReport, RecordSummary};
