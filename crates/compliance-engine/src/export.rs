//! 报告导出
//!
//! JSON 与 CSV 两种格式，全部基于已计算的报告生成。

use crate::error::Result;
use crate::report::{failed_conditions, BatchReport};
use serde_json::Value;

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    VerdictsCsv,
    FailuresCsv,
}

/// 按格式导出报告
pub fn export(report: &BatchReport, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(report),
        ExportFormat::VerdictsCsv => Ok(verdicts_to_csv(report)),
        ExportFormat::FailuresCsv => Ok(failures_to_csv(report)),
    }
}

/// 导出完整报告为 JSON
pub fn to_json(report: &BatchReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// 每个 (记录, 规则) 组合一行
pub fn verdicts_to_csv(report: &BatchReport) -> String {
    let mut out = String::new();
    write_row(
        &mut out,
        &[
            "record_source",
            "record_index",
            "record",
            "rule_source",
            "rule_index",
            "rule",
            "passed",
            "failed_conditions",
        ],
    );

    for verdict in &report.verdicts {
        let failed = failed_conditions(verdict).len();

        write_row(
            &mut out,
            &[
                &verdict.record.source_name,
                &verdict.record.index.to_string(),
                &verdict.record.label,
                &verdict.rule.source_name,
                &verdict.rule.index.to_string(),
                &verdict.rule.label,
                if verdict.passed { "true" } else { "false" },
                &failed.to_string(),
            ],
        );
    }

    out
}

/// 每个失败条件一行
pub fn failures_to_csv(report: &BatchReport) -> String {
    let mut out = String::new();
    write_row(
        &mut out,
        &[
            "record_source",
            "record",
            "rule_source",
            "rule",
            "field",
            "operator",
            "expected",
            "actual",
            "negated",
            "error",
        ],
    );

    for (record, failure) in report.failures() {
        write_row(
            &mut out,
            &[
                &record.source_name,
                &record.label,
                &failure.rule.source_name,
                &failure.rule.label,
                failure.field.as_deref().unwrap_or(""),
                failure.operator.as_deref().unwrap_or(""),
                &cell_value(Some(&failure.expected)),
                &cell_value(failure.actual.as_ref()),
                if failure.negated { "true" } else { "false" },
                failure.error.as_deref().unwrap_or(""),
            ],
        );
    }

    out
}

/// 字符串原样输出，其他值输出紧凑 JSON，不存在时为空
fn cell_value(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_row(out: &mut String, cells: &[&str]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(cell));
    }
    out.push_str("\r\n");
}

/// RFC 4180 转义
fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
