//! 评估结果汇总
//!
//! 按记录聚合结论，并把导致规则失败的叶子条件展开为平铺列表，
//! 供界面展示与导出使用。只读取已计算的结论，不会重新评估。

use crate::models::{EvaluationVerdict, NodeOutcome, RecordRef, RuleRef};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// 导致规则失败的单个叶子
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCondition {
    pub rule: RuleRef,
    pub field: Option<String>,
    pub operator: Option<String>,
    pub expected: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 位于 NOT 之下：该叶子是因为"通过"而导致规则失败
    pub negated: bool,
}

/// 单条记录的汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub record: RecordRef,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub failures: Vec<FailedCondition>,
}

/// 批量评估统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub records: usize,
    pub rules: usize,
    pub evaluations: usize,
    pub passed: usize,
    pub failed: usize,
    /// 是否因组合数上限而截断
    pub truncated: bool,
    pub duration_ms: i64,
}

/// 批量评估报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub stats: BatchStats,
    pub summaries: Vec<RecordSummary>,
    pub verdicts: Vec<EvaluationVerdict>,
}

impl BatchReport {
    /// 从结论列表构建报告，汇总顺序与记录首次出现的顺序一致
    pub fn from_verdicts(verdicts: Vec<EvaluationVerdict>) -> Self {
        let mut summaries: Vec<RecordSummary> = Vec::new();
        // 记录按 (来源, 下标) 定位到其汇总
        let mut positions: HashMap<(i64, usize), usize> = HashMap::new();
        let mut rules: HashSet<(i64, usize)> = HashSet::new();

        for verdict in &verdicts {
            rules.insert((verdict.rule.source_id, verdict.rule.index));

            let key = (verdict.record.source_id, verdict.record.index);
            let i = *positions.entry(key).or_insert_with(|| {
                summaries.push(RecordSummary {
                    record: verdict.record.clone(),
                    total: 0,
                    passed: 0,
                    failed: 0,
                    failures: Vec::new(),
                });
                summaries.len() - 1
            });
            let summary = &mut summaries[i];

            summary.total += 1;
            if verdict.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
                summary.failures.extend(failed_conditions(verdict));
            }
        }

        let passed = verdicts.iter().filter(|v| v.passed).count();

        let stats = BatchStats {
            records: summaries.len(),
            rules: rules.len(),
            evaluations: verdicts.len(),
            passed,
            failed: verdicts.len() - passed,
            truncated: false,
            duration_ms: 0,
        };

        Self {
            stats,
            summaries,
            verdicts,
        }
    }

    /// 所有记录的失败条件
    pub fn failures(&self) -> impl Iterator<Item = (&RecordRef, &FailedCondition)> {
        self.summaries
            .iter()
            .flat_map(|s| s.failures.iter().map(move |f| (&s.record, f)))
    }
}

/// 展开单个结论中导致失败的叶子；通过的结论返回空列表
pub fn failed_conditions(verdict: &EvaluationVerdict) -> Vec<FailedCondition> {
    let mut out = Vec::new();
    if !verdict.passed {
        collect(&verdict.detail, false, &verdict.rule, &mut out);
    }
    out
}

/// 沿着与 `want` 结果一致的分支下降：want=false 时收集失败叶子，
/// 经过 NOT 时翻转，收集导致取反失败的通过叶子
fn collect(node: &NodeOutcome, want: bool, rule: &RuleRef, out: &mut Vec<FailedCondition>) {
    match node {
        NodeOutcome::Condition(c) => {
            if c.passed == want {
                out.push(FailedCondition {
                    rule: rule.clone(),
                    field: Some(c.field.clone()),
                    operator: Some(c.operator.clone()),
                    expected: c.expected.clone(),
                    actual: c.actual.clone(),
                    error: c.error.clone(),
                    negated: want,
                });
            }
        }
        NodeOutcome::Malformed { error, raw, .. } => {
            // 无法识别的节点恒为失败，取反后不会"导致"失败
            if !want {
                out.push(FailedCondition {
                    rule: rule.clone(),
                    field: None,
                    operator: None,
                    expected: raw.clone(),
                    actual: None,
                    error: Some(error.clone()),
                    negated: false,
                });
            }
        }
        NodeOutcome::AllOf { passed, children } | NodeOutcome::AnyOf { passed, children } => {
            if *passed == want {
                for child in children.iter().filter(|c| c.passed() == want) {
                    collect(child, want, rule, out);
                }
            }
        }
        NodeOutcome::Not { passed, child } => {
            if *passed == want {
                collect(child, !want, rule, out);
            }
        }
    }
}
