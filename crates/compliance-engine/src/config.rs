//! 引擎配置
//!
//! 包装键、发现键、标签键和别名表都可按部署配置，构建后以不可变对象传入评估流程，
//! 同一进程内可以并存多份配置而互不影响。

use serde::Deserialize;
use std::collections::HashMap;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 结构定位配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// 规则文档的包装键，按优先级排列
    pub rule_wrapper_keys: Vec<String>,
    /// 记录文档的包装键，按优先级排列
    pub record_wrapper_keys: Vec<String>,
    /// 是否启用启发式数组探测
    pub heuristic_enabled: bool,
    /// 启发式探测接受的最小数组长度
    pub min_heuristic_array_size: usize,
    /// 规则文档顶层出现这些键（大小写不敏感）时，整个文档就是一条规则，不做启发式探测
    pub rule_node_keys: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            rule_wrapper_keys: strings(&[
                "policies",
                "rules",
                "checks",
                "requirements",
                "constraints",
                "validations",
            ]),
            record_wrapper_keys: strings(&["users", "data", "records", "items", "entries", "people"]),
            heuristic_enabled: true,
            min_heuristic_array_size: 1,
            // 与 DiscoveryConfig 的默认字段/操作符/值/组合/根节点键一致
            rule_node_keys: strings(&[
                "field",
                "attribute",
                "property",
                "key",
                "op",
                "operator",
                "comparison",
                "must_be",
                "value",
                "expected",
                "target",
                "threshold",
                "allOf",
                "and",
                "anyOf",
                "or",
                "not",
                "rule",
                "condition",
                "conditions",
                "criteria",
                "when",
            ]),
        }
    }
}

/// 规则节点键发现配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub field_keys: Vec<String>,
    pub operator_keys: Vec<String>,
    pub value_keys: Vec<String>,
    /// AND 组合键（大小写不敏感）
    pub all_of_keys: Vec<String>,
    /// OR 组合键（大小写不敏感）
    pub any_of_keys: Vec<String>,
    /// NOT 组合键（大小写不敏感）
    pub not_keys: Vec<String>,
    /// 规则文档根节点所在的键
    pub root_keys: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            field_keys: strings(&["field", "attribute", "property", "key"]),
            operator_keys: strings(&["op", "operator", "comparison", "must_be"]),
            value_keys: strings(&["value", "expected", "target", "threshold"]),
            all_of_keys: strings(&["allOf", "and"]),
            any_of_keys: strings(&["anyOf", "or"]),
            not_keys: strings(&["not"]),
            root_keys: strings(&["rule", "condition", "conditions", "criteria", "when"]),
        }
    }
}

/// 显示标签配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub record_label_keys: Vec<String>,
    pub rule_label_keys: Vec<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            record_label_keys: strings(&[
                "user_id",
                "id",
                "email",
                "username",
                "name",
                "first_name",
                "last_name",
                "display_name",
            ]),
            rule_label_keys: strings(&[
                "name",
                "title",
                "id",
                "policy",
                "policy_id",
                "policy_name",
                "description",
            ]),
        }
    }
}

/// 批量评估配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// 工作线程数，0 表示使用可用核数
    pub parallelism: usize,
    /// 每个工作线程至少分配的组合数，避免小批量时的线程开销
    pub min_pairs_per_worker: usize,
    /// 单次调用最多评估的组合数
    pub max_pairs: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            min_pairs_per_worker: 256,
            max_pairs: None,
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub discovery: DiscoveryConfig,
    pub labels: LabelConfig,
    pub batch: BatchConfig,
    /// 追加的操作符别名：别名 -> 规范符号
    pub operator_aliases: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.normalizer.rule_wrapper_keys[0], "policies");
        assert_eq!(config.normalizer.record_wrapper_keys[0], "users");
        assert_eq!(config.normalizer.min_heuristic_array_size, 1);
        assert!(config.normalizer.heuristic_enabled);
        assert_eq!(config.discovery.field_keys, ["field", "attribute", "property", "key"]);
        assert_eq!(config.batch.parallelism, 0);
        assert!(config.operator_aliases.is_empty());
    }

    #[test]
    fn test_rule_node_keys_cover_discovery_keys() {
        let config = EngineConfig::default();
        let d = &config.discovery;
        let node_keys = &config.normalizer.rule_node_keys;

        for key in d
            .field_keys
            .iter()
            .chain(&d.operator_keys)
            .chain(&d.value_keys)
            .chain(&d.all_of_keys)
            .chain(&d.any_of_keys)
            .chain(&d.not_keys)
            .chain(&d.root_keys)
        {
            assert!(node_keys.contains(key), "missing rule node key {}", key);
        }
        assert_eq!(d.root_keys, ["rule", "condition", "conditions", "criteria", "when"]);
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let json = r#"
        {
            "normalizer": {"rule_wrapper_keys": ["controls"], "min_heuristic_array_size": 2},
            "operator_aliases": {"mindestens": ">="}
        }
        "#;

        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.normalizer.rule_wrapper_keys, ["controls"]);
        assert_eq!(config.normalizer.min_heuristic_array_size, 2);
        assert_eq!(config.normalizer.record_wrapper_keys[0], "users");
        assert_eq!(config.discovery.operator_keys[0], "op");
        assert_eq!(config.operator_aliases["mindestens"], ">=");
    }
}
