//! 配置管理模块
//!
//! 支持多文件分层加载与环境变量覆盖，反序列化为调用方给定的配置类型。

use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// 环境变量前缀，如 COMPLIANCE_OBSERVABILITY__LOG_LEVEL -> observability.log_level
pub const ENV_PREFIX: &str = "COMPLIANCE";

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 当前运行环境，来自 COMPLIANCE_ENV，默认 development
pub fn environment() -> String {
    std::env::var(format!("{}_ENV", ENV_PREFIX)).unwrap_or_else(|_| "development".to_string())
}

/// 从配置目录和环境变量加载配置
///
/// 配置目录取自 CONFIG_DIR，默认 `config`。
pub fn load<T: DeserializeOwned>(service_name: &str, list_keys: &[&str]) -> Result<T, ConfigError> {
    // .env 文件可选
    dotenvy::dotenv().ok();

    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    load_from(Path::new(&config_dir), service_name, list_keys)
}

/// 从指定目录加载配置
///
/// 加载顺序（后加载的会覆盖先加载的同名配置项）：
/// 1. {dir}/default.toml（默认配置）
/// 2. {dir}/{environment}.toml（环境特定配置）
/// 3. {dir}/{service_name}.toml（服务特定配置）
/// 4. 环境变量（COMPLIANCE_ 前缀，`__` 分隔层级；`list_keys` 中的键按逗号拆分为列表）
pub fn load_from<T: DeserializeOwned>(
    dir: &Path,
    service_name: &str,
    list_keys: &[&str],
) -> Result<T, ConfigError> {
    let env = environment();

    let mut env_source = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true);
    if !list_keys.is_empty() {
        env_source = env_source.list_separator(",");
        for key in list_keys {
            env_source = env_source.with_list_parse_key(key);
        }
    }

    let builder = Config::builder()
        .set_default("service_name", service_name)?
        .set_default("environment", env.clone())?
        .add_source(File::from(dir.join("default.toml")).required(false))
        .add_source(File::from(dir.join(format!("{}.toml", env))).required(false))
        .add_source(File::from(dir.join(format!("{}.toml", service_name))).required(false))
        .add_source(env_source);

    builder.build()?.try_deserialize()
}
