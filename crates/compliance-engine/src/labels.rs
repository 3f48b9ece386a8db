//! 显示标签提取
//!
//! 按配置的标签键优先级从条目中取第一个标量值作为标签，
//! 取不到时使用来源名称加序号。

use serde_json::Value;

/// 从条目中提取显示标签
pub fn extract_label(entry: &Value, keys: &[String]) -> Option<String> {
    let map = entry.as_object()?;

    keys.iter().find_map(|key| match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// 提取标签，失败时回退为来源名称（多条目时附带 1 起始的序号）
pub fn label_or_fallback(
    entry: &Value,
    keys: &[String],
    source_name: &str,
    index: usize,
    total: usize,
) -> String {
    extract_label(entry, keys).unwrap_or_else(|| {
        if total <= 1 {
            source_name.to_string()
        } else {
            format!("{} #{}", source_name, index + 1)
        }
    })
}
