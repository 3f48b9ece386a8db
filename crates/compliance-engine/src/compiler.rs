//! 规则编译器
//!
//! 对任意形状的规则 JSON 做一次性分类（动态键发现），得到封闭的 `RuleNode` 树。
//! 分类优先级：条件 > 组合 > 单键语法糖 > 无法识别。编译本身不会失败，
//! 无法识别的节点编译为 `RuleNode::Malformed`，在评估时计为失败。

use crate::config::{DiscoveryConfig, EngineConfig};
use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::models::{Condition, RuleNode};
use crate::operators::{Operator, OperatorRegistry};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    AllOf,
    AnyOf,
    Not,
}

/// 规则编译器
#[derive(Debug, Clone)]
pub struct RuleCompiler {
    registry: OperatorRegistry,
    discovery: DiscoveryConfig,
}

impl RuleCompiler {
    pub fn new(registry: OperatorRegistry, discovery: DiscoveryConfig) -> Self {
        Self {
            registry,
            discovery,
        }
    }

    /// 按引擎配置构建（包含追加的操作符别名）
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let registry = OperatorRegistry::new().with_aliases(&config.operator_aliases)?;
        Ok(Self::new(registry, config.discovery.clone()))
    }

    /// 编译一条规则文档：先查找根节点键，否则整个条目即根节点
    pub fn compile_document(&self, entry: &Value) -> RuleNode {
        if let Value::Object(map) = entry {
            let root = self.discovery.root_keys.iter().find_map(|key| match map.get(key) {
                Some(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
                _ => None,
            });
            if let Some(root) = root {
                return self.compile_node(root);
            }
        }

        self.compile_node(entry)
    }

    /// 编译规则节点
    pub fn compile_node(&self, node: &Value) -> RuleNode {
        match node {
            Value::Object(map) => self.compile_object(map, node),
            // 数组节点视为 AND
            Value::Array(items) => {
                RuleNode::AllOf(items.iter().map(|item| self.compile_node(item)).collect())
            }
            other => Self::malformed(
                format!(
                    "规则节点必须是对象，实际为 {}",
                    ConditionEvaluator::type_name(other)
                ),
                other,
            ),
        }
    }

    fn compile_object(&self, map: &Map<String, Value>, raw: &Value) -> RuleNode {
        let field = Self::find_string(map, &self.discovery.field_keys);
        let alias = Self::find_value(map, &self.discovery.operator_keys).map(Self::operator_text);
        let expected = Self::find_value(map, &self.discovery.value_keys);

        match (field, alias.as_deref(), expected) {
            (Some(field), Some(alias), expected) => {
                return self.build_condition(field, alias, expected, raw);
            }
            // 只有字段和值时按相等比较
            (Some(field), None, Some(expected)) => {
                return RuleNode::Condition(Condition::new(field, Operator::Eq, expected.clone()));
            }
            _ => {}
        }

        let combinators = self.find_combinators(map);
        if !combinators.is_empty() {
            let mut nodes: Vec<RuleNode> = combinators
                .into_iter()
                .map(|(kind, value)| Self::combine(kind, self.children(value)))
                .collect();

            return if nodes.len() == 1 {
                nodes.remove(0)
            } else {
                RuleNode::AllOf(nodes)
            };
        }

        if map.len() == 1 {
            if let Some((key, value)) = map.iter().next() {
                if !self.is_reserved_key(key) {
                    return RuleNode::Implicit {
                        key: key.clone(),
                        value: value.clone(),
                    };
                }
            }
        }

        Self::malformed(
            format!(
                "未找到字段/操作符/值键或组合键 (键: {})",
                map.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            raw,
        )
    }

    fn build_condition(
        &self,
        field: &str,
        alias: &str,
        expected: Option<&Value>,
        raw: &Value,
    ) -> RuleNode {
        match self.registry.resolve(alias) {
            Ok(op) => match expected {
                Some(value) => RuleNode::Condition(Condition {
                    field: field.to_string(),
                    operator_alias: alias.to_string(),
                    operator: Some(op),
                    expected: value.clone(),
                }),
                None if op.is_unary() => RuleNode::Condition(Condition {
                    field: field.to_string(),
                    operator_alias: alias.to_string(),
                    operator: Some(op),
                    expected: Value::Null,
                }),
                None => Self::malformed(
                    format!("条件 '{}' 的操作符 {} 缺少期望值", field, op),
                    raw,
                ),
            },
            // 未知别名在评估时报告，只影响该条件
            Err(_) => {
                debug!(field, alias, "未注册的操作符别名");
                RuleNode::Condition(Condition {
                    field: field.to_string(),
                    operator_alias: alias.to_string(),
                    operator: None,
                    expected: expected.cloned().unwrap_or(Value::Null),
                })
            }
        }
    }

    /// 组合节点的子节点：对象为单个子节点，数组为子节点列表
    fn children(&self, value: &Value) -> Vec<RuleNode> {
        match value {
            Value::Array(items) => items.iter().map(|item| self.compile_node(item)).collect(),
            other => vec![self.compile_node(other)],
        }
    }

    fn combine(kind: Combinator, mut children: Vec<RuleNode>) -> RuleNode {
        match kind {
            Combinator::AllOf => RuleNode::all_of(children),
            Combinator::AnyOf => RuleNode::any_of(children),
            Combinator::Not if children.len() == 1 => RuleNode::negate(children.remove(0)),
            // not 作用于数组时，对其 AND 取反
            Combinator::Not => RuleNode::negate(RuleNode::AllOf(children)),
        }
    }

    /// 按 AND、OR、NOT 的优先级收集组合键，值必须是对象或数组
    fn find_combinators<'a>(&self, map: &'a Map<String, Value>) -> Vec<(Combinator, &'a Value)> {
        let groups = [
            (Combinator::AllOf, &self.discovery.all_of_keys),
            (Combinator::AnyOf, &self.discovery.any_of_keys),
            (Combinator::Not, &self.discovery.not_keys),
        ];

        let mut found = Vec::new();
        for (kind, keys) in groups {
            for key in keys {
                for (k, v) in map {
                    if k.eq_ignore_ascii_case(key) && (v.is_object() || v.is_array()) {
                        found.push((kind, v));
                    }
                }
            }
        }
        found
    }

    fn is_reserved_key(&self, key: &str) -> bool {
        let d = &self.discovery;
        let exact = [&d.field_keys, &d.operator_keys, &d.value_keys];
        let folded = [&d.all_of_keys, &d.any_of_keys, &d.not_keys];

        exact.iter().any(|keys| keys.iter().any(|k| k == key))
            || folded
                .iter()
                .any(|keys| keys.iter().any(|k| k.eq_ignore_ascii_case(key)))
    }

    /// 按优先级查找第一个值为字符串的键
    fn find_string<'a>(map: &'a Map<String, Value>, keys: &[String]) -> Option<&'a str> {
        keys.iter().find_map(|key| map.get(key).and_then(Value::as_str))
    }

    /// 操作符键的文本；非字符串值按 JSON 文本保留，评估时报告为未知操作符
    fn operator_text(value: &Value) -> Cow<'_, str> {
        match value {
            Value::String(alias) => Cow::Borrowed(alias),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// 按优先级查找第一个存在的键
    fn find_value<'a>(map: &'a Map<String, Value>, keys: &[String]) -> Option<&'a Value> {
        keys.iter().find_map(|key| map.get(key))
    }

    fn malformed(reason: String, raw: &Value) -> RuleNode {
        debug!(%reason, "无法识别的规则节点");
        RuleNode::Malformed {
            reason,
            raw: raw.clone(),
        }
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(OperatorRegistry::new(), DiscoveryConfig::default())
    }
}

/// 收集规则中引用的所有字段路径
pub fn referenced_fields(node: &RuleNode) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    collect_fields(node, &mut fields);
    fields
}

fn collect_fields(node: &RuleNode, fields: &mut BTreeSet<String>) {
    match node {
        RuleNode::Condition(cond) => {
            fields.insert(cond.field.clone());
        }
        RuleNode::Implicit { key, .. } => {
            fields.insert(key.clone());
        }
        RuleNode::AllOf(children) | RuleNode::AnyOf(children) => {
            for child in children {
                collect_fields(child, fields);
            }
        }
        RuleNode::Not(child) => collect_fields(child, fields),
        RuleNode::Malformed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(value: Value) -> RuleNode {
        RuleCompiler::default().compile_node(&value)
    }

    #[test]
    fn test_condition_discovery() {
        let node = compile(json!({"field": "age", "op": ">=", "value": 18}));
        assert_eq!(
            node,
            RuleNode::Condition(Condition {
                field: "age".to_string(),
                operator_alias: ">=".to_string(),
                operator: Some(Operator::Gte),
                expected: json!(18),
            })
        );
    }

    #[test]
    fn test_alternative_keys_and_aliases() {
        let node = compile(json!({
            "attribute": "security.mfa_enabled",
            "comparison": "Equals",
            "expected": true
        }));
        let RuleNode::Condition(cond) = node else {
            panic!("expected condition");
        };
        assert_eq!(cond.field, "security.mfa_enabled");
        assert_eq!(cond.operator, Some(Operator::Eq));
        assert_eq!(cond.operator_alias, "Equals");
        assert_eq!(cond.expected, json!(true));
    }

    #[test]
    fn test_key_priority() {
        // field 优先于 key，op 优先于 operator
        let node = compile(json!({
            "key": "ignored",
            "field": "age",
            "operator": "<",
            "op": "at_least",
            "threshold": 1,
            "value": 21
        }));
        let RuleNode::Condition(cond) = node else {
            panic!("expected condition");
        };
        assert_eq!(cond.field, "age");
        assert_eq!(cond.operator, Some(Operator::Gte));
        assert_eq!(cond.expected, json!(21));
    }

    #[test]
    fn test_unknown_operator_becomes_condition() {
        let node = compile(json!({"field": "age", "op": "roughly", "value": 18}));
        let RuleNode::Condition(cond) = node else {
            panic!("expected condition");
        };
        assert_eq!(cond.operator, None);
        assert_eq!(cond.operator_alias, "roughly");
    }

    #[test]
    fn test_non_string_operator_is_not_equality() {
        let node = compile(json!({"field": "age", "op": 5, "value": 30}));
        let RuleNode::Condition(cond) = &node else {
            panic!("expected condition");
        };
        assert_eq!(cond.operator, None);
        assert_eq!(cond.operator_alias, "5");

        let outcome = crate::RuleExecutor::new().evaluate_node(&node, &json!({"age": 30}));
        assert!(!outcome.passed());

        let node = compile(json!({"field": "age", "operator": null, "value": 30}));
        let RuleNode::Condition(cond) = node else {
            panic!("expected condition");
        };
        assert_eq!(cond.operator, None);
        assert_eq!(cond.operator_alias, "null");
    }

    #[test]
    fn test_unary_operator_without_value() {
        let node = compile(json!({"field": "manager", "op": "exists"}));
        assert_eq!(
            node,
            RuleNode::Condition(Condition {
                field: "manager".to_string(),
                operator_alias: "exists".to_string(),
                operator: Some(Operator::Exists),
                expected: Value::Null,
            })
        );

        let node = compile(json!({"field": "age", "op": ">"}));
        assert!(matches!(node, RuleNode::Malformed { .. }));
    }

    #[test]
    fn test_field_and_value_without_operator() {
        let node = compile(json!({"field": "status", "value": "active"}));
        assert_eq!(
            node,
            RuleNode::Condition(Condition::new("status", Operator::Eq, "active"))
        );
    }

    #[test]
    fn test_combinators() {
        let node = compile(json!({
            "allOf": [
                {"field": "age", "op": ">=", "value": 18},
                {"anyOf": [{"role": "admin"}, {"role": "owner"}]},
                {"not": {"status": "suspended"}}
            ]
        }));

        let RuleNode::AllOf(children) = node else {
            panic!("expected allOf");
        };
        assert_eq!(children.len(), 3);
        assert!(matches!(children[0], RuleNode::Condition(_)));
        assert!(matches!(&children[1], RuleNode::AnyOf(c) if c.len() == 2));
        assert!(matches!(&children[2], RuleNode::Not(c) if matches!(**c, RuleNode::Implicit { .. })));
    }

    #[test]
    fn test_combinator_keys_are_case_insensitive() {
        assert!(matches!(compile(json!({"ALLOF": []})), RuleNode::AllOf(c) if c.is_empty()));
        assert!(matches!(compile(json!({"anyof": [{"a": 1}]})), RuleNode::AnyOf(_)));
        assert!(matches!(compile(json!({"AND": [{"a": 1}]})), RuleNode::AllOf(_)));
        assert!(matches!(compile(json!({"Or": [{"a": 1}]})), RuleNode::AnyOf(_)));
        assert!(matches!(compile(json!({"NOT": {"a": 1}})), RuleNode::Not(_)));
    }

    #[test]
    fn test_combinator_with_metadata_keys() {
        let node = compile(json!({
            "name": "Admin policy",
            "description": "Admins need MFA",
            "allOf": [{"mfa": true}]
        }));
        assert!(matches!(node, RuleNode::AllOf(c) if c.len() == 1));
    }

    #[test]
    fn test_not_over_array() {
        let node = compile(json!({"not": [{"a": 1}, {"b": 2}]}));
        let RuleNode::Not(inner) = node else {
            panic!("expected not");
        };
        assert!(matches!(*inner, RuleNode::AllOf(ref c) if c.len() == 2));
    }

    #[test]
    fn test_multiple_combinators_are_and_combined() {
        let node = compile(json!({
            "not": {"status": "suspended"},
            "anyOf": [{"a": 1}],
            "allOf": [{"b": 2}]
        }));
        let RuleNode::AllOf(children) = node else {
            panic!("expected allOf");
        };
        assert!(matches!(children[0], RuleNode::AllOf(_)));
        assert!(matches!(children[1], RuleNode::AnyOf(_)));
        assert!(matches!(children[2], RuleNode::Not(_)));
    }

    #[test]
    fn test_implicit_sugar() {
        assert_eq!(
            compile(json!({"department": "Engineering"})),
            RuleNode::Implicit {
                key: "department".to_string(),
                value: json!("Engineering"),
            }
        );
    }

    #[test]
    fn test_malformed_nodes() {
        // 单个保留键不能作为语法糖
        assert!(matches!(compile(json!({"field": "age"})), RuleNode::Malformed { .. }));
        assert!(matches!(compile(json!({"not": 5})), RuleNode::Malformed { .. }));
        assert!(matches!(compile(json!({"a": 1, "b": 2})), RuleNode::Malformed { .. }));
        assert!(matches!(compile(json!({})), RuleNode::Malformed { .. }));
        assert!(matches!(compile(json!("text")), RuleNode::Malformed { .. }));
        assert!(matches!(compile(json!(null)), RuleNode::Malformed { .. }));
    }

    #[test]
    fn test_non_string_field_is_not_a_field_key() {
        let node = compile(json!({"field": 42, "op": "==", "value": 1}));
        assert!(matches!(node, RuleNode::Malformed { .. }));
    }

    #[test]
    fn test_document_root_key() {
        let compiler = RuleCompiler::default();
        let node = compiler.compile_document(&json!({
            "id": "P-001",
            "name": "Adults only",
            "rule": {"field": "age", "op": ">=", "value": 18}
        }));
        assert!(matches!(node, RuleNode::Condition(ref c) if c.field == "age"));

        // 没有根节点键时整个条目即根节点
        let node = compiler.compile_document(&json!({"name": "x"}));
        assert!(matches!(node, RuleNode::Implicit { .. }));
    }

    #[test]
    fn test_configured_aliases_via_engine_config() {
        let mut config = EngineConfig::default();
        config
            .operator_aliases
            .insert("mindestens".to_string(), ">=".to_string());

        let compiler = RuleCompiler::from_config(&config).unwrap();
        let node = compiler.compile_node(&json!({"field": "age", "op": "mindestens", "value": 18}));
        assert!(matches!(node, RuleNode::Condition(ref c) if c.operator == Some(Operator::Gte)));
    }

    #[test]
    fn test_referenced_fields() {
        let node = compile(json!({
            "allOf": [
                {"field": "age", "op": ">=", "value": 18},
                {"anyOf": [{"role": "admin"}, {"field": "age", "op": "<", "value": 65}]},
                {"not": {"field": "security.locked", "op": "truthy"}}
            ]
        }));

        let fields: Vec<_> = referenced_fields(&node).into_iter().collect();
        assert_eq!(fields, ["age", "role", "security.locked"]);
    }
}
