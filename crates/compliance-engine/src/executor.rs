//! 规则执行器
//!
//! 对规则树做无状态递归求值，始终同时返回结论与诊断树。
//! 组合节点不短路：所有子节点都会被评估，保证诊断信息完整。

use crate::error::RuleError;
use crate::evaluator::ConditionEvaluator;
use crate::models::{
    Condition, ConditionOutcome, EvaluationVerdict, NodeOutcome, RecordDocument, RuleDocument,
    RuleNode,
};
use crate::operators::Operator;
use crate::path;
use serde_json::Value;

/// 规则执行器
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleExecutor;

impl RuleExecutor {
    pub fn new() -> Self {
        Self
    }

    /// 评估单个 (记录, 规则) 组合
    pub fn execute(&self, rule: &RuleDocument, record: &RecordDocument) -> EvaluationVerdict {
        let detail = self.evaluate_node(&rule.root, &record.data);

        EvaluationVerdict {
            record: record.reference.clone(),
            rule: rule.reference.clone(),
            passed: detail.passed(),
            detail,
        }
    }

    /// 递归评估规则节点
    pub fn evaluate_node(&self, node: &RuleNode, record: &Value) -> NodeOutcome {
        match node {
            RuleNode::Condition(cond) => NodeOutcome::Condition(self.evaluate_condition(cond, record)),
            RuleNode::Implicit { key, value } => NodeOutcome::Condition(self.evaluate_leaf(
                key,
                Some(Operator::Eq),
                Operator::Eq.symbol(),
                value,
                record,
                true,
            )),
            RuleNode::AllOf(children) => {
                let children = self.evaluate_children(children, record);
                NodeOutcome::AllOf {
                    passed: children.iter().all(NodeOutcome::passed),
                    children,
                }
            }
            RuleNode::AnyOf(children) => {
                let children = self.evaluate_children(children, record);
                NodeOutcome::AnyOf {
                    passed: children.iter().any(NodeOutcome::passed),
                    children,
                }
            }
            RuleNode::Not(child) => {
                let child = self.evaluate_node(child, record);
                NodeOutcome::Not {
                    passed: !child.passed(),
                    child: Box::new(child),
                }
            }
            RuleNode::Malformed { reason, raw } => NodeOutcome::Malformed {
                passed: false,
                error: RuleError::MalformedRuleNode(reason.clone()).to_string(),
                raw: raw.clone(),
            },
        }
    }

    /// 评估条件节点
    pub fn evaluate_condition(&self, cond: &Condition, record: &Value) -> ConditionOutcome {
        self.evaluate_leaf(
            &cond.field,
            cond.operator,
            &cond.operator_alias,
            &cond.expected,
            record,
            false,
        )
    }

    fn evaluate_children(&self, children: &[RuleNode], record: &Value) -> Vec<NodeOutcome> {
        children
            .iter()
            .map(|child| self.evaluate_node(child, record))
            .collect()
    }

    /// 叶子求值：错误就地捕获，记为失败并附带错误信息
    fn evaluate_leaf(
        &self,
        field: &str,
        operator: Option<Operator>,
        alias: &str,
        expected: &Value,
        record: &Value,
        implicit: bool,
    ) -> ConditionOutcome {
        let actual = path::resolve(record, field);

        let (operator_name, result) = match operator {
            Some(op) => (op.to_string(), ConditionEvaluator::evaluate(actual, op, expected)),
            None => (
                alias.to_string(),
                Err(RuleError::UnknownOperator(alias.to_string())),
            ),
        };

        let (passed, error) = match result {
            Ok(passed) => (passed, None),
            Err(err) => (false, Some(err.to_string())),
        };

        ConditionOutcome {
            field: field.to_string(),
            operator: operator_name,
            expected: expected.clone(),
            actual: actual.as_option().cloned(),
            passed,
            error,
            implicit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::RuleCompiler;
    use serde_json::json;

    fn run(rule: Value, record: Value) -> NodeOutcome {
        let node = RuleCompiler::default().compile_node(&rule);
        RuleExecutor::new().evaluate_node(&node, &record)
    }

    fn leaf(outcome: &NodeOutcome) -> &ConditionOutcome {
        match outcome {
            NodeOutcome::Condition(c) => c,
            other => panic!("expected condition outcome, got {:?}", other),
        }
    }

    fn age_and_status() -> Value {
        json!({
            "allOf": [
                {"field": "age", "op": ">=", "value": 18},
                {"field": "status", "op": "==", "value": "active"}
            ]
        })
    }

    #[test]
    fn test_all_of_passes() {
        let outcome = run(age_and_status(), json!({"age": 25, "status": "active"}));
        assert!(outcome.passed());

        let NodeOutcome::AllOf { children, .. } = &outcome else {
            panic!("expected allOf");
        };
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(NodeOutcome::passed));
    }

    #[test]
    fn test_all_of_fails_with_full_diagnostics() {
        let outcome = run(age_and_status(), json!({"age": 16, "status": "active"}));
        assert!(!outcome.passed());

        let NodeOutcome::AllOf { children, .. } = &outcome else {
            panic!("expected allOf");
        };
        // 不短路：第一个子节点失败后第二个仍被评估
        assert_eq!(children.len(), 2);

        let first = leaf(&children[0]);
        assert!(!first.passed);
        assert_eq!(first.expected, json!(18));
        assert_eq!(first.actual, Some(json!(16)));
        assert_eq!(first.operator, ">=");

        let second = leaf(&children[1]);
        assert!(second.passed);
        assert_eq!(second.actual, Some(json!("active")));
    }

    #[test]
    fn test_empty_combinators() {
        assert!(run(json!({"allOf": []}), json!({})).passed());
        assert!(!run(json!({"anyOf": []}), json!({})).passed());
    }

    #[test]
    fn test_any_of_evaluates_all_children() {
        let outcome = run(
            json!({"anyOf": [{"role": "admin"}, {"role": "owner"}, {"role": "viewer"}]}),
            json!({"role": "admin"}),
        );
        assert!(outcome.passed());

        let NodeOutcome::AnyOf { children, .. } = &outcome else {
            panic!("expected anyOf");
        };
        assert_eq!(children.len(), 3);
        assert!(children[0].passed());
        assert!(!children[1].passed());
        assert!(!children[2].passed());
    }

    #[test]
    fn test_not() {
        let rule = json!({"not": {"status": "suspended"}});
        assert!(run(rule.clone(), json!({"status": "active"})).passed());
        assert!(!run(rule, json!({"status": "suspended"})).passed());
    }

    #[test]
    fn test_implicit_sugar() {
        let outcome = run(json!({"department": "Engineering"}), json!({"department": "Sales"}));
        let cond = leaf(&outcome);
        assert!(!cond.passed);
        assert!(cond.implicit);
        assert_eq!(cond.field, "department");
        assert_eq!(cond.operator, "==");
        assert_eq!(cond.expected, json!("Engineering"));
        assert_eq!(cond.actual, Some(json!("Sales")));
    }

    #[test]
    fn test_string_ordering_succeeds() {
        let outcome = run(json!({"field": "name", "op": ">", "value": "M"}), json!({"name": "Smith"}));
        let cond = leaf(&outcome);
        assert!(cond.passed);
        assert!(cond.error.is_none());
    }

    #[test]
    fn test_comparison_error_is_contained() {
        let outcome = run(
            json!({
                "allOf": [
                    {"field": "verified", "op": ">", "value": 5},
                    {"field": "age", "op": ">=", "value": 18}
                ]
            }),
            json!({"verified": true, "age": 30}),
        );
        assert!(!outcome.passed());

        let NodeOutcome::AllOf { children, .. } = &outcome else {
            panic!("expected allOf");
        };
        let broken = leaf(&children[0]);
        assert!(!broken.passed);
        assert_eq!(broken.actual, Some(json!(true)));
        assert!(broken.error.as_deref().is_some_and(|e| e.contains("boolean")));

        let sibling = leaf(&children[1]);
        assert!(sibling.passed);
        assert!(sibling.error.is_none());
    }

    #[test]
    fn test_unknown_operator_is_contained() {
        let outcome = run(
            json!({"anyOf": [
                {"field": "age", "op": "roughly", "value": 18},
                {"field": "age", "op": "greater_than", "value": 18}
            ]}),
            json!({"age": 30}),
        );
        assert!(outcome.passed());

        let NodeOutcome::AnyOf { children, .. } = &outcome else {
            panic!("expected anyOf");
        };
        let unknown = leaf(&children[0]);
        assert!(!unknown.passed);
        assert_eq!(unknown.operator, "roughly");
        assert_eq!(unknown.actual, Some(json!(30)));
        assert!(unknown.error.as_deref().is_some_and(|e| e.contains("roughly")));
    }

    #[test]
    fn test_malformed_node_fails_without_aborting() {
        let outcome = run(
            json!({"anyOf": [{"a": 1, "b": 2}, {"age": 30}]}),
            json!({"age": 30}),
        );
        assert!(outcome.passed());

        let NodeOutcome::AnyOf { children, .. } = &outcome else {
            panic!("expected anyOf");
        };
        assert!(matches!(
            &children[0],
            NodeOutcome::Malformed { passed: false, error, .. } if !error.is_empty()
        ));
    }

    #[test]
    fn test_absent_and_null_fields() {
        let exists = json!({"field": "manager", "op": "exists"});
        let missing = json!({"field": "manager", "op": "not_exists"});

        assert!(run(exists.clone(), json!({"manager": null})).passed());
        assert!(!run(exists, json!({})).passed());
        assert!(run(missing, json!({})).passed());

        let outcome = run(json!({"field": "manager", "op": "==", "value": "bob"}), json!({}));
        let cond = leaf(&outcome);
        assert!(!cond.passed);
        assert!(cond.error.is_none());
        assert_eq!(cond.actual, None);

        let outcome = run(
            json!({"field": "manager", "op": "==", "value": "bob"}),
            json!({"manager": null}),
        );
        assert_eq!(leaf(&outcome).actual, Some(Value::Null));
    }

    #[test]
    fn test_nested_paths() {
        let outcome = run(
            json!({"field": "security.mfa_enabled", "op": "is_true"}),
            json!({"security": {"mfa_enabled": true}}),
        );
        assert!(outcome.passed());
    }

    #[test]
    fn test_leaf_count_matches_conditions() {
        let outcome = run(
            json!({"allOf": [
                {"a": 1},
                {"anyOf": [{"b": 2}, {"not": {"c": 3}}]},
                {"field": "d", "op": "exists"}
            ]}),
            json!({}),
        );
        assert_eq!(outcome.leaf_count(), 4);
    }
}
