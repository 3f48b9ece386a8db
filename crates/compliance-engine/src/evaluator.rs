//! 条件评估器
//!
//! 实现各规范操作符的比较逻辑。有序比较只允许 数字×数字 或 字符串×字符串，
//! 其他类型组合返回 `Comparison` 错误而不是做隐式转换。

use crate::error::{Result, RuleError};
use crate::operators::Operator;
use crate::path::FieldValue;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `actual` - 从记录中解析出的字段值（可能不存在）
    /// * `operator` - 规范操作符
    /// * `expected` - 规则中定义的期望值
    pub fn evaluate(actual: FieldValue<'_>, operator: Operator, expected: &Value) -> Result<bool> {
        // 存在性检查需要区分"不存在"与"null"
        match operator {
            Operator::Exists => return Ok(actual.is_present()),
            Operator::NotExists => return Ok(!actual.is_present()),
            Operator::IsEmpty => return Ok(Self::is_empty(actual)),
            _ => {}
        }

        // 字段不存在时，其余操作均视为比较失败（不是错误）
        let actual = match actual {
            FieldValue::Present(v) => v,
            FieldValue::Absent => return Ok(false),
        };

        match operator {
            Operator::Eq => Ok(Self::eq(actual, expected)),
            Operator::Neq => Ok(!Self::eq(actual, expected)),
            Operator::Gt => Self::ordered(operator, actual, expected, Ordering::is_gt),
            Operator::Gte => Self::ordered(operator, actual, expected, Ordering::is_ge),
            Operator::Lt => Self::ordered(operator, actual, expected, Ordering::is_lt),
            Operator::Lte => Self::ordered(operator, actual, expected, Ordering::is_le),
            Operator::Between => Self::between(actual, expected),
            Operator::In => Self::in_collection(actual, expected),
            Operator::NotIn => Self::in_collection(actual, expected).map(|r| !r),
            Operator::Contains => Self::contains(actual, expected),
            Operator::NotContains => Self::contains(actual, expected).map(|r| !r),
            Operator::ContainsAny => Self::contains_any(actual, expected),
            Operator::ContainsAll => Self::contains_all(actual, expected),
            Operator::StartsWith => {
                Self::string_pair(operator, actual, expected).map(|(s, p)| s.starts_with(p))
            }
            Operator::EndsWith => {
                Self::string_pair(operator, actual, expected).map(|(s, p)| s.ends_with(p))
            }
            Operator::Regex => Self::regex_match(actual, expected),
            Operator::Before => Self::time_compare(actual, expected, |a, b| a < b),
            Operator::After => Self::time_compare(actual, expected, |a, b| a > b),
            Operator::IsNull => Ok(actual.is_null()),
            Operator::IsNotEmpty => Ok(!Self::is_empty(FieldValue::Present(actual))),
            Operator::Truthy => Ok(Self::is_truthy(actual)),
            Operator::Falsy => Ok(!Self::is_truthy(actual)),
            Operator::Exists => Ok(true),
            Operator::NotExists => Ok(false),
            Operator::IsEmpty => Ok(Self::is_empty(FieldValue::Present(actual))),
        }
    }

    /// 判断值是否为空
    fn is_empty(value: FieldValue<'_>) -> bool {
        match value {
            FieldValue::Absent => true,
            FieldValue::Present(Value::Null) => true,
            FieldValue::Present(Value::String(s)) => s.is_empty(),
            FieldValue::Present(Value::Array(arr)) => arr.is_empty(),
            FieldValue::Present(Value::Object(obj)) => obj.is_empty(),
            _ => false,
        }
    }

    /// 布尔强制转换
    pub fn is_truthy(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !matches!(
                s.trim().to_lowercase().as_str(),
                "" | "false" | "no" | "off" | "0" | "n"
            ),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
        }
    }

    /// 相等比较
    fn eq(actual: &Value, expected: &Value) -> bool {
        // 数值按大小比较，100 与 100.0 相等
        if let (Value::Number(a), Value::Number(b)) = (actual, expected) {
            return Self::number_cmp(a, b) == Some(Ordering::Equal);
        }

        actual == expected
    }

    /// 数值比较：两侧都是整数时按 i128 精确比较，否则按浮点
    fn number_cmp(a: &Number, b: &Number) -> Option<Ordering> {
        fn integer(n: &Number) -> Option<i128> {
            n.as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
        }

        match (integer(a), integer(b)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    /// 有序比较的公共实现
    fn compare(operator: Operator, actual: &Value, expected: &Value) -> Result<Ordering> {
        match (actual, expected) {
            (Value::Number(a), Value::Number(b)) => {
                Self::number_cmp(a, b).ok_or_else(|| Self::mismatch(operator, actual, expected))
            }
            // 按 Unicode 码点的字典序
            (Value::String(a), Value::String(b)) => Ok(a.as_str().cmp(b.as_str())),
            _ => Err(Self::mismatch(operator, actual, expected)),
        }
    }

    fn ordered<F>(operator: Operator, actual: &Value, expected: &Value, accept: F) -> Result<bool>
    where
        F: Fn(Ordering) -> bool,
    {
        Self::compare(operator, actual, expected).map(accept)
    }

    /// 范围比较 (between)，expected 为闭区间 [min, max]
    fn between(actual: &Value, expected: &Value) -> Result<bool> {
        let bounds = match expected.as_array() {
            Some(arr) if arr.len() == 2 => arr,
            _ => {
                return Err(RuleError::InvalidOperand(format!(
                    "between 操作符需要 [min, max] 数组，实际为 {}",
                    expected
                )));
            }
        };

        let lower = Self::compare(Operator::Between, actual, &bounds[0])?;
        let upper = Self::compare(Operator::Between, actual, &bounds[1])?;
        Ok(lower.is_ge() && upper.is_le())
    }

    /// 成员检查 (in)
    fn in_collection(actual: &Value, expected: &Value) -> Result<bool> {
        match (actual, expected) {
            (_, Value::Array(items)) => Ok(items.iter().any(|item| Self::eq(actual, item))),
            (Value::String(needle), Value::String(haystack)) => Ok(haystack.contains(needle.as_str())),
            (Value::String(key), Value::Object(map)) => Ok(map.contains_key(key)),
            _ => Err(Self::mismatch(Operator::In, actual, expected)),
        }
    }

    /// 字符串/数组/对象包含检查
    fn contains(actual: &Value, expected: &Value) -> Result<bool> {
        match (actual, expected) {
            (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
            (Value::Array(items), _) => Ok(items.iter().any(|item| Self::eq(item, expected))),
            (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
            _ => Err(Self::mismatch(Operator::Contains, actual, expected)),
        }
    }

    /// 数组包含任意一个 (contains_any)
    fn contains_any(actual: &Value, expected: &Value) -> Result<bool> {
        let (items, wanted) = Self::array_pair(Operator::ContainsAny, actual, expected)?;
        Ok(wanted
            .iter()
            .any(|w| items.iter().any(|item| Self::eq(item, w))))
    }

    /// 数组包含全部 (contains_all)
    fn contains_all(actual: &Value, expected: &Value) -> Result<bool> {
        let (items, wanted) = Self::array_pair(Operator::ContainsAll, actual, expected)?;
        Ok(wanted
            .iter()
            .all(|w| items.iter().any(|item| Self::eq(item, w))))
    }

    /// actual 必须是数组；标量 expected 视为单元素列表
    fn array_pair<'v>(
        operator: Operator,
        actual: &'v Value,
        expected: &'v Value,
    ) -> Result<(&'v [Value], &'v [Value])> {
        let items = actual
            .as_array()
            .ok_or_else(|| Self::mismatch(operator, actual, expected))?;

        let wanted = match expected {
            Value::Array(arr) => arr.as_slice(),
            other => std::slice::from_ref(other),
        };

        Ok((items.as_slice(), wanted))
    }

    fn string_pair<'v>(
        operator: Operator,
        actual: &'v Value,
        expected: &'v Value,
    ) -> Result<(&'v str, &'v str)> {
        match (actual, expected) {
            (Value::String(a), Value::String(b)) => Ok((a.as_str(), b.as_str())),
            _ => Err(Self::mismatch(operator, actual, expected)),
        }
    }

    /// 正则表达式匹配（搜索语义，不要求整串匹配）
    fn regex_match(actual: &Value, expected: &Value) -> Result<bool> {
        let (s, pattern) = Self::string_pair(Operator::Regex, actual, expected)?;

        let regex = Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(regex.is_match(s))
    }

    /// 时间比较
    fn time_compare<F>(actual: &Value, expected: &Value, cmp: F) -> Result<bool>
    where
        F: Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
    {
        let actual_time = Self::parse_datetime(actual)?;
        let expected_time = Self::parse_datetime(expected)?;

        Ok(cmp(actual_time, expected_time))
    }

    /// 解析日期时间
    fn parse_datetime(value: &Value) -> Result<DateTime<Utc>> {
        let s = value
            .as_str()
            .ok_or_else(|| RuleError::InvalidDateTime(value.to_string()))?;

        // ISO 8601 / RFC 3339
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        // 纯日期
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .ok_or_else(|| RuleError::InvalidDateTime(s.to_string()))
    }

    fn mismatch(operator: Operator, actual: &Value, expected: &Value) -> RuleError {
        RuleError::Comparison {
            operator: operator.to_string(),
            actual: Self::type_name(actual).to_string(),
            expected: Self::type_name(expected).to_string(),
        }
    }

    /// 获取值的类型名称
    pub fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}
