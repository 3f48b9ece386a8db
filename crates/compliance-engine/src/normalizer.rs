//! 文档结构定位
//!
//! 在任意形状的上传文档中找到规则列表或记录列表。定位顺序：
//! 1. 包装键（按配置顺序，第一个值为非空数组的键胜出）
//! 2. 启发式探测（最长的全对象数组，长度相同时取先出现者）；
//!    规则文档顶层带有条件/组合/根节点键时视为单条规则，跳过此步
//! 3. 单条目回退（整个文档作为唯一条目）
//!
//! 该过程不会失败，结果至少包含一个条目。

use crate::config::NormalizerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// 文档角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    RuleSource,
    RecordSource,
}

impl fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuleSource => write!(f, "rule-source"),
            Self::RecordSource => write!(f, "record-source"),
        }
    }
}

/// 条目的定位方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", content = "key", rename_all = "snake_case")]
pub enum Strategy {
    WrapperKey(String),
    Heuristic(Option<String>),
    SingleItem,
}

/// 结构定位结果
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<'a> {
    pub entries: Vec<&'a Value>,
    pub strategy: Strategy,
}

/// 定位文档中的条目序列
pub fn normalize<'a>(
    document: &'a Value,
    role: DocumentRole,
    config: &NormalizerConfig,
) -> Vec<&'a Value> {
    locate(document, role, config).entries
}

/// 定位文档中的条目序列，并返回所用的定位方式
pub fn locate<'a>(
    document: &'a Value,
    role: DocumentRole,
    config: &NormalizerConfig,
) -> Normalized<'a> {
    if let Some((key, items)) = match_wrapper_key(document, wrapper_keys(role, config)) {
        debug!(%role, key, count = items.len(), "通过包装键定位条目");
        return Normalized {
            entries: items.iter().collect(),
            strategy: Strategy::WrapperKey(key.to_string()),
        };
    }

    // 单条规则文档：组合子节点数组不能被当作规则列表
    if role == DocumentRole::RuleSource && is_rule_node(document, &config.rule_node_keys) {
        debug!(%role, "文档本身是规则节点，作为单条目");
        return Normalized {
            entries: vec![document],
            strategy: Strategy::SingleItem,
        };
    }

    if config.heuristic_enabled {
        if let Some((key, items)) = detect_longest_array(document, config.min_heuristic_array_size)
        {
            debug!(%role, key = ?key, count = items.len(), "通过启发式探测定位条目");
            return Normalized {
                entries: items.iter().collect(),
                strategy: Strategy::Heuristic(key.map(str::to_string)),
            };
        }
    }

    debug!(%role, "未找到条目列表，整个文档作为单条目");
    Normalized {
        entries: vec![document],
        strategy: Strategy::SingleItem,
    }
}

fn wrapper_keys(role: DocumentRole, config: &NormalizerConfig) -> &[String] {
    match role {
        DocumentRole::RuleSource => &config.rule_wrapper_keys,
        DocumentRole::RecordSource => &config.record_wrapper_keys,
    }
}

fn is_rule_node(document: &Value, node_keys: &[String]) -> bool {
    document.as_object().is_some_and(|map| {
        map.keys()
            .any(|key| node_keys.iter().any(|k| k.eq_ignore_ascii_case(key)))
    })
}

/// 包装键匹配：优先级由配置顺序决定，与文档中的键顺序无关
fn match_wrapper_key<'a, 'k>(
    document: &'a Value,
    keys: &'k [String],
) -> Option<(&'k str, &'a Vec<Value>)> {
    let map = document.as_object()?;

    keys.iter().find_map(|key| match map.get(key) {
        Some(Value::Array(items)) if !items.is_empty() => Some((key.as_str(), items)),
        _ => None,
    })
}

/// 启发式探测：候选为顶层数组本身及文档的直接子值
fn detect_longest_array(
    document: &Value,
    min_size: usize,
) -> Option<(Option<&str>, &Vec<Value>)> {
    let min_size = min_size.max(1);

    let candidates: Vec<(Option<&str>, &Value)> = match document {
        Value::Array(items) => std::iter::once((None, document))
            .chain(items.iter().map(|item| (None, item)))
            .collect(),
        Value::Object(map) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        _ => return None,
    };

    let mut best: Option<(Option<&str>, &Vec<Value>)> = None;
    for (key, value) in candidates {
        let Value::Array(items) = value else {
            continue;
        };
        if items.len() < min_size || !items.iter().all(Value::is_object) {
            continue;
        }
        // 严格大于，保证长度相同时先出现者胜出
        if best.is_none_or(|(_, current)| items.len() > current.len()) {
            best = Some((key, items));
        }
    }

    best
}
