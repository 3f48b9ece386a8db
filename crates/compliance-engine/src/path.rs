//! 字段路径解析
//!
//! 点号分隔的路径（如 `security.mfa_enabled`）只遍历对象嵌套，不支持数组下标；
//! 数组作为原子值交给包含类操作符处理。

use serde_json::Value;

/// 字段解析结果
///
/// `Absent` 与显式的 `null`（`Present(Value::Null)`）是两种不同的状态。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Present(&'a Value),
    Absent,
}

impl<'a> FieldValue<'a> {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn as_option(&self) -> Option<&'a Value> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

/// 按点号路径解析记录中的字段值
pub fn resolve<'a>(record: &'a Value, path: &str) -> FieldValue<'a> {
    if path.is_empty() {
        return FieldValue::Absent;
    }

    let mut current = record;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => current = next,
                None => return FieldValue::Absent,
            },
            _ => return FieldValue::Absent,
        }
    }

    FieldValue::Present(current)
}
