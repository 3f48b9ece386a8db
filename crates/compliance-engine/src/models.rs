//! 规则引擎领域模型

use crate::operators::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 上传的原始文档（规则集或记录集）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: i64,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub content: Value,
}

impl SourceDocument {
    pub fn new(id: i64, name: impl Into<String>, content: Value) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
            content,
        }
    }
}

/// 规则在其来源文档中的位置与显示标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleRef {
    pub source_id: i64,
    pub source_name: String,
    pub index: usize,
    pub label: String,
}

/// 记录在其来源文档中的位置与显示标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRef {
    pub source_id: i64,
    pub source_name: String,
    pub index: usize,
    pub label: String,
}

/// 编译后的单条规则
#[derive(Debug, Clone)]
pub struct RuleDocument {
    pub reference: RuleRef,
    pub raw: Value,
    pub root: RuleNode,
}

/// 单条待检查记录
#[derive(Debug, Clone)]
pub struct RecordDocument {
    pub reference: RecordRef,
    pub data: Value,
}

/// 规则节点
///
/// 由 `RuleCompiler` 对原始 JSON 一次性分类得到，评估时只做静态分派。
#[derive(Debug, Clone, PartialEq)]
pub enum RuleNode {
    Condition(Condition),
    /// 单键语法糖：`{"department": "Engineering"}` 等价于 `department == "Engineering"`
    Implicit { key: String, value: Value },
    AllOf(Vec<RuleNode>),
    AnyOf(Vec<RuleNode>),
    Not(Box<RuleNode>),
    /// 无法识别的节点，评估结果恒为失败
    Malformed { reason: String, raw: Value },
}

impl RuleNode {
    pub fn all_of(children: Vec<RuleNode>) -> Self {
        Self::AllOf(children)
    }

    pub fn any_of(children: Vec<RuleNode>) -> Self {
        Self::AnyOf(children)
    }

    pub fn negate(child: RuleNode) -> Self {
        Self::Not(Box::new(child))
    }
}

/// 条件节点
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    /// 规则中书写的原始操作符
    pub operator_alias: String,
    /// 归一化后的规范操作符，别名未注册时为 None
    pub operator: Option<Operator>,
    pub expected: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, expected: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator_alias: operator.symbol().to_string(),
            operator: Some(operator),
            expected: expected.into(),
        }
    }
}

/// 单个条件的评估记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionOutcome {
    pub field: String,
    /// 规范操作符；别名未知时为原始别名
    pub operator: String,
    pub expected: Value,
    /// 实际值，字段不存在时省略（显式 null 会保留为 null）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub implicit: bool,
}

/// 诊断树，与规则节点结构一一对应
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeOutcome {
    Condition(ConditionOutcome),
    AllOf {
        passed: bool,
        children: Vec<NodeOutcome>,
    },
    AnyOf {
        passed: bool,
        children: Vec<NodeOutcome>,
    },
    Not {
        passed: bool,
        child: Box<NodeOutcome>,
    },
    Malformed {
        passed: bool,
        error: String,
        raw: Value,
    },
}

impl NodeOutcome {
    pub fn passed(&self) -> bool {
        match self {
            Self::Condition(outcome) => outcome.passed,
            Self::AllOf { passed, .. }
            | Self::AnyOf { passed, .. }
            | Self::Not { passed, .. }
            | Self::Malformed { passed, .. } => *passed,
        }
    }

    /// 叶子节点（条件与无法识别的节点）数量
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Condition(_) | Self::Malformed { .. } => 1,
            Self::AllOf { children, .. } | Self::AnyOf { children, .. } => {
                children.iter().map(Self::leaf_count).sum()
            }
            Self::Not { child, .. } => child.leaf_count(),
        }
    }
}

/// 单个 (记录, 规则) 组合的评估结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationVerdict {
    pub record: RecordRef,
    pub rule: RuleRef,
    pub passed: bool,
    pub detail: NodeOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_serialization() {
        let outcome = NodeOutcome::AllOf {
            passed: false,
            children: vec![
                NodeOutcome::Condition(ConditionOutcome {
                    field: "age".to_string(),
                    operator: ">=".to_string(),
                    expected: json!(18),
                    actual: Some(json!(16)),
                    passed: false,
                    error: None,
                    implicit: false,
                }),
                NodeOutcome::Condition(ConditionOutcome {
                    field: "manager".to_string(),
                    operator: "exists".to_string(),
                    expected: json!(null),
                    actual: None,
                    passed: false,
                    error: None,
                    implicit: false,
                }),
            ],
        };

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["type"], "all_of");
        assert_eq!(value["children"][0]["type"], "condition");
        assert_eq!(value["children"][0]["actual"], 16);
        assert!(value["children"][0].get("error").is_none());
        assert!(value["children"][0].get("implicit").is_none());
        // 字段不存在时不输出 actual
        assert!(value["children"][1].get("actual").is_none());
    }

    #[test]
    fn test_explicit_null_actual_is_serialized() {
        let outcome = ConditionOutcome {
            field: "manager".to_string(),
            operator: "==".to_string(),
            expected: json!("bob"),
            actual: Some(Value::Null),
            passed: false,
            error: None,
            implicit: true,
        };

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value.get("actual"), Some(&Value::Null));
        assert_eq!(value["implicit"], true);
    }

    #[test]
    fn test_leaf_count() {
        let leaf = |passed| {
            NodeOutcome::Condition(ConditionOutcome {
                field: "f".to_string(),
                operator: "==".to_string(),
                expected: json!(1),
                actual: None,
                passed,
                error: None,
                implicit: false,
            })
        };

        let tree = NodeOutcome::AnyOf {
            passed: true,
            children: vec![
                leaf(true),
                NodeOutcome::Not {
                    passed: true,
                    child: Box::new(leaf(false)),
                },
            ],
        };

        assert_eq!(tree.leaf_count(), 2);
        assert!(tree.passed());
    }

    #[test]
    fn test_source_document_deserialization() {
        let json = r#"{"id": 7, "name": "policies.json", "content": {"rules": []}}"#;
        let source: SourceDocument = serde_json::from_str(json).unwrap();
        assert_eq!(source.id, 7);
        assert_eq!(source.name, "policies.json");
        assert_eq!(source.content, json!({"rules": []}));
    }
}
