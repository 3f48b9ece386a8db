//! 规则操作符定义与别名注册表
//!
//! 所有操作符都是预先注册的固定比较函数，注册表只负责把自然语言别名
//! 归一化为规范操作符，不存在执行外部代码的途径。

use crate::error::{Result, RuleError};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// 规范操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // 通用比较
    Eq,
    Neq,

    // 有序比较
    Gt,
    Gte,
    Lt,
    Lte,
    Between,

    // 包含检查
    In,
    NotIn,
    Contains,
    NotContains,
    ContainsAny,
    ContainsAll,

    // 字符串操作
    StartsWith,
    EndsWith,
    Regex,

    // 时间操作
    Before,
    After,

    // 存在性与空值检查
    Exists,
    NotExists,
    IsNull,
    IsEmpty,
    IsNotEmpty,

    // 布尔强制转换
    Truthy,
    Falsy,
}

impl Operator {
    pub const ALL: [Operator; 25] = [
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Between,
        Self::In,
        Self::NotIn,
        Self::Contains,
        Self::NotContains,
        Self::ContainsAny,
        Self::ContainsAll,
        Self::StartsWith,
        Self::EndsWith,
        Self::Regex,
        Self::Before,
        Self::After,
        Self::Exists,
        Self::NotExists,
        Self::IsNull,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::Truthy,
        Self::Falsy,
    ];

    /// 规范符号
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::ContainsAny => "contains_any",
            Self::ContainsAll => "contains_all",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
            Self::Before => "before",
            Self::After => "after",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::IsNull => "is_null",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::Truthy => "truthy",
            Self::Falsy => "falsy",
        }
    }

    /// 按规范符号查找
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.symbol() == symbol)
    }

    /// 不需要期望值的一元操作符
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Self::Exists
                | Self::NotExists
                | Self::IsNull
                | Self::IsEmpty
                | Self::IsNotEmpty
                | Self::Truthy
                | Self::Falsy
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

/// 内置别名表
const BUILTIN_ALIASES: &[(&str, Operator)] = &[
    // ==
    ("=", Operator::Eq),
    ("===", Operator::Eq),
    ("eq", Operator::Eq),
    ("equals", Operator::Eq),
    ("equal", Operator::Eq),
    ("equal_to", Operator::Eq),
    ("equals_to", Operator::Eq),
    ("is", Operator::Eq),
    ("is_equal", Operator::Eq),
    ("is_equal_to", Operator::Eq),
    ("same_as", Operator::Eq),
    ("exactly", Operator::Eq),
    ("must_be", Operator::Eq),
    ("must_equal", Operator::Eq),
    ("should_be", Operator::Eq),
    // !=
    ("<>", Operator::Neq),
    ("!==", Operator::Neq),
    ("ne", Operator::Neq),
    ("neq", Operator::Neq),
    ("not_equal", Operator::Neq),
    ("not_equals", Operator::Neq),
    ("not_equal_to", Operator::Neq),
    ("is_not", Operator::Neq),
    ("isnt", Operator::Neq),
    ("different_from", Operator::Neq),
    ("differs_from", Operator::Neq),
    ("must_not_be", Operator::Neq),
    ("must_not_equal", Operator::Neq),
    // >
    ("gt", Operator::Gt),
    ("greater", Operator::Gt),
    ("greater_than", Operator::Gt),
    ("is_greater_than", Operator::Gt),
    ("more_than", Operator::Gt),
    ("above", Operator::Gt),
    ("over", Operator::Gt),
    ("exceeds", Operator::Gt),
    ("higher_than", Operator::Gt),
    ("bigger_than", Operator::Gt),
    // >=
    ("=>", Operator::Gte),
    ("gte", Operator::Gte),
    ("ge", Operator::Gte),
    ("greater_or_equal", Operator::Gte),
    ("greater_than_or_equal", Operator::Gte),
    ("greater_than_or_equal_to", Operator::Gte),
    ("at_least", Operator::Gte),
    ("min", Operator::Gte),
    ("minimum", Operator::Gte),
    ("no_less_than", Operator::Gte),
    ("not_less_than", Operator::Gte),
    // <
    ("lt", Operator::Lt),
    ("less", Operator::Lt),
    ("less_than", Operator::Lt),
    ("is_less_than", Operator::Lt),
    ("fewer_than", Operator::Lt),
    ("below", Operator::Lt),
    ("under", Operator::Lt),
    ("lower_than", Operator::Lt),
    ("smaller_than", Operator::Lt),
    // <=
    ("=<", Operator::Lte),
    ("lte", Operator::Lte),
    ("le", Operator::Lte),
    ("less_or_equal", Operator::Lte),
    ("less_than_or_equal", Operator::Lte),
    ("less_than_or_equal_to", Operator::Lte),
    ("at_most", Operator::Lte),
    ("max", Operator::Lte),
    ("maximum", Operator::Lte),
    ("no_more_than", Operator::Lte),
    ("not_more_than", Operator::Lte),
    ("not_greater_than", Operator::Lte),
    // between
    ("in_range", Operator::Between),
    ("within_range", Operator::Between),
    ("is_between", Operator::Between),
    ("range", Operator::Between),
    // in
    ("is_in", Operator::In),
    ("in_list", Operator::In),
    ("one_of", Operator::In),
    ("is_one_of", Operator::In),
    ("is_any_of", Operator::In),
    ("member_of", Operator::In),
    ("among", Operator::In),
    ("within", Operator::In),
    // not_in
    ("nin", Operator::NotIn),
    ("is_not_in", Operator::NotIn),
    ("not_in_list", Operator::NotIn),
    ("not_one_of", Operator::NotIn),
    ("none_of", Operator::NotIn),
    ("is_none_of", Operator::NotIn),
    ("not_member_of", Operator::NotIn),
    ("not_among", Operator::NotIn),
    ("excluded_from", Operator::NotIn),
    // contains
    ("contain", Operator::Contains),
    ("has", Operator::Contains),
    ("includes", Operator::Contains),
    ("include", Operator::Contains),
    ("has_item", Operator::Contains),
    ("has_element", Operator::Contains),
    // not_contains
    ("does_not_contain", Operator::NotContains),
    ("not_includes", Operator::NotContains),
    ("does_not_include", Operator::NotContains),
    ("excludes", Operator::NotContains),
    ("lacks", Operator::NotContains),
    // contains_any
    ("has_any", Operator::ContainsAny),
    ("includes_any", Operator::ContainsAny),
    ("contains_some", Operator::ContainsAny),
    ("intersects", Operator::ContainsAny),
    ("overlaps", Operator::ContainsAny),
    // contains_all
    ("has_all", Operator::ContainsAll),
    ("includes_all", Operator::ContainsAll),
    ("has_every", Operator::ContainsAll),
    ("contains_every", Operator::ContainsAll),
    ("superset_of", Operator::ContainsAll),
    // starts_with
    ("startswith", Operator::StartsWith),
    ("begins_with", Operator::StartsWith),
    ("has_prefix", Operator::StartsWith),
    ("prefix", Operator::StartsWith),
    // ends_with
    ("endswith", Operator::EndsWith),
    ("finishes_with", Operator::EndsWith),
    ("has_suffix", Operator::EndsWith),
    ("suffix", Operator::EndsWith),
    // regex
    ("re", Operator::Regex),
    ("regexp", Operator::Regex),
    ("matches", Operator::Regex),
    ("match", Operator::Regex),
    ("matches_regex", Operator::Regex),
    ("pattern", Operator::Regex),
    // before / after
    ("is_before", Operator::Before),
    ("earlier_than", Operator::Before),
    ("prior_to", Operator::Before),
    ("is_after", Operator::After),
    ("later_than", Operator::After),
    ("since", Operator::After),
    // exists
    ("exist", Operator::Exists),
    ("present", Operator::Exists),
    ("is_present", Operator::Exists),
    ("defined", Operator::Exists),
    ("is_defined", Operator::Exists),
    ("is_set", Operator::Exists),
    ("has_field", Operator::Exists),
    // not_exists
    ("not_exist", Operator::NotExists),
    ("does_not_exist", Operator::NotExists),
    ("absent", Operator::NotExists),
    ("is_absent", Operator::NotExists),
    ("missing", Operator::NotExists),
    ("is_missing", Operator::NotExists),
    ("not_present", Operator::NotExists),
    ("undefined", Operator::NotExists),
    ("is_undefined", Operator::NotExists),
    // is_null
    ("null", Operator::IsNull),
    ("is_none", Operator::IsNull),
    ("none", Operator::IsNull),
    // is_empty
    ("empty", Operator::IsEmpty),
    ("blank", Operator::IsEmpty),
    ("is_blank", Operator::IsEmpty),
    // is_not_empty
    ("not_empty", Operator::IsNotEmpty),
    ("non_empty", Operator::IsNotEmpty),
    ("is_non_empty", Operator::IsNotEmpty),
    ("not_blank", Operator::IsNotEmpty),
    ("is_not_blank", Operator::IsNotEmpty),
    ("filled", Operator::IsNotEmpty),
    // truthy
    ("true", Operator::Truthy),
    ("is_true", Operator::Truthy),
    ("is_truthy", Operator::Truthy),
    ("enabled", Operator::Truthy),
    ("is_enabled", Operator::Truthy),
    ("yes", Operator::Truthy),
    // falsy
    ("false", Operator::Falsy),
    ("is_false", Operator::Falsy),
    ("is_falsy", Operator::Falsy),
    ("disabled", Operator::Falsy),
    ("is_disabled", Operator::Falsy),
    ("no", Operator::Falsy),
];

/// 操作符别名注册表
///
/// 构建后只读，可在多个评估线程间共享。
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    aliases: HashMap<String, Operator>,
}

impl OperatorRegistry {
    /// 使用内置别名表创建
    pub fn new() -> Self {
        let mut aliases = HashMap::with_capacity(BUILTIN_ALIASES.len() + Operator::ALL.len());

        // 规范符号本身也是别名，保证归一化幂等
        for op in Operator::ALL {
            aliases.insert(op.symbol().to_string(), op);
        }
        for (alias, op) in BUILTIN_ALIASES {
            aliases.insert(Self::normalize_key(alias), *op);
        }

        Self { aliases }
    }

    /// 在内置别名表上追加部署配置的别名（别名 -> 规范符号）
    pub fn with_aliases<'a, I>(mut self, extra: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (alias, target) in extra {
            let op = self.resolve(target).map_err(|_| {
                RuleError::InvalidConfig(format!(
                    "别名 '{}' 指向未知的操作符 '{}'",
                    alias, target
                ))
            })?;
            self.aliases.insert(Self::normalize_key(alias), op);
        }
        Ok(self)
    }

    /// 将别名归一化为规范操作符（大小写不敏感）
    pub fn resolve(&self, alias: &str) -> Result<Operator> {
        self.aliases
            .get(&Self::normalize_key(alias))
            .copied()
            .ok_or_else(|| RuleError::UnknownOperator(alias.to_string()))
    }

    /// 别名查找键：去除首尾空白、小写，空格和连字符视为下划线
    fn normalize_key(alias: &str) -> String {
        alias
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
