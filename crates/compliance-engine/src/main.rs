//! 合规检查命令行
//!
//! 读取规则集与记录集 JSON 文件，执行批量评估并输出报告。
//!
//! 引擎通过 `metrics` 门面记录评估计数与批次耗时。命令行不安装记录器，
//! 这些指标在此进程内被丢弃；嵌入到服务时由宿主安装导出器。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use compliance_engine::export::{self, ExportFormat};
use compliance_engine::normalizer;
use compliance_engine::{compiler, labels};
use compliance_engine::{BatchEvaluator, DocumentRole, EngineConfig, RuleCompiler, SourceDocument};
use compliance_shared::config::{self as shared_config, ObservabilityConfig};
use compliance_shared::observability;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

const SERVICE_NAME: &str = "compliance-check";

/// 环境变量中按逗号拆分为列表的配置键
const LIST_KEYS: &[&str] = &[
    "engine.normalizer.rule_wrapper_keys",
    "engine.normalizer.record_wrapper_keys",
    "engine.normalizer.rule_node_keys",
    "engine.discovery.field_keys",
    "engine.discovery.operator_keys",
    "engine.discovery.value_keys",
    "engine.discovery.all_of_keys",
    "engine.discovery.any_of_keys",
    "engine.discovery.not_keys",
    "engine.discovery.root_keys",
    "engine.labels.record_label_keys",
    "engine.labels.rule_label_keys",
];

/// 命令行配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Settings {
    service_name: String,
    environment: String,
    observability: ObservabilityConfig,
    engine: EngineConfig,
}

#[derive(Debug, Parser)]
#[command(name = "compliance-check", version, about = "对 JSON 记录集批量执行合规规则")]
struct Cli {
    /// 配置目录，默认读取 CONFIG_DIR 或 ./config
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 用规则集评估记录集
    Evaluate {
        /// 规则集文件
        #[arg(long, required = true, num_args = 1..)]
        rules: Vec<PathBuf>,

        /// 记录集文件
        #[arg(long, required = true, num_args = 1..)]
        records: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// 输出文件，缺省时写到标准输出
        #[arg(long)]
        output: Option<PathBuf>,

        /// 覆盖配置中的最大组合数
        #[arg(long)]
        max_pairs: Option<usize>,

        /// 存在失败结论时以非零状态退出
        #[arg(long)]
        fail_on_violation: bool,
    },
    /// 显示文档的结构定位结果
    Normalize {
        #[arg(long, value_enum)]
        role: Role,

        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    CsvVerdicts,
    CsvFailures,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::CsvVerdicts => ExportFormat::VerdictsCsv,
            Format::CsvFailures => ExportFormat::FailuresCsv,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Rule,
    Record,
}

impl From<Role> for DocumentRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Rule => DocumentRole::RuleSource,
            Role::Record => DocumentRole::RecordSource,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = match &cli.config_dir {
        Some(dir) => shared_config::load_from::<Settings>(dir, SERVICE_NAME, LIST_KEYS),
        None => shared_config::load::<Settings>(SERVICE_NAME, LIST_KEYS),
    };
    let settings = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        Settings::default()
    });

    observability::init(&settings.observability)?;
    info!(
        service = %settings.service_name,
        environment = %settings.environment,
        "配置已加载"
    );

    match cli.command {
        Command::Evaluate {
            rules,
            records,
            format,
            output,
            max_pairs,
            fail_on_violation,
        } => {
            let mut engine = settings.engine;
            if max_pairs.is_some() {
                engine.batch.max_pairs = max_pairs;
            }

            let rule_sources = read_sources(&rules, 1).await?;
            let record_sources = read_sources(&records, rule_sources.len() as i64 + 1).await?;

            let evaluator = BatchEvaluator::new(engine).context("引擎配置无效")?;
            let report = tokio::task::spawn_blocking(move || {
                evaluator.run(&rule_sources, &record_sources)
            })
            .await?;

            let rendered = export::export(&report, format.into())?;
            write_output(output.as_deref(), &rendered).await?;

            if fail_on_violation && report.stats.failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Normalize { role, file } => {
            let source = read_source(&file, 1).await?;
            let compiler = RuleCompiler::from_config(&settings.engine).context("引擎配置无效")?;
            let view = describe(&source, role.into(), &settings.engine, &compiler);
            write_output(None, &serde_json::to_string_pretty(&view)?).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// 定位结果的可读视图；规则文档附带每条规则引用的字段
fn describe(
    source: &SourceDocument,
    role: DocumentRole,
    config: &EngineConfig,
    rule_compiler: &RuleCompiler,
) -> Value {
    let located = normalizer::locate(&source.content, role, &config.normalizer);
    let total = located.entries.len();
    let label_keys = match role {
        DocumentRole::RuleSource => &config.labels.rule_label_keys,
        DocumentRole::RecordSource => &config.labels.record_label_keys,
    };

    let entries: Vec<Value> = located
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let label = labels::label_or_fallback(entry, label_keys, &source.name, index, total);
            match role {
                DocumentRole::RuleSource => {
                    let fields = compiler::referenced_fields(&rule_compiler.compile_document(entry));
                    json!({"index": index, "label": label, "fields": fields})
                }
                DocumentRole::RecordSource => json!({"index": index, "label": label}),
            }
        })
        .collect();

    json!({
        "source": source.name,
        "role": role,
        "locator": located.strategy,
        "count": total,
        "entries": entries,
    })
}

async fn read_sources(paths: &[PathBuf], first_id: i64) -> Result<Vec<SourceDocument>> {
    let mut sources = Vec::with_capacity(paths.len());
    for (offset, path) in paths.iter().enumerate() {
        sources.push(read_source(path, first_id + offset as i64).await?);
    }
    Ok(sources)
}

async fn read_source(path: &Path, id: i64) -> Result<SourceDocument> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取文件 {}", path.display()))?;
    let content: Value = serde_json::from_str(&text)
        .with_context(|| format!("文件不是合法的 JSON: {}", path.display()))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(SourceDocument::new(id, name, content))
}

async fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("无法写入文件 {}", path.display()))?;
            info!(path = %path.display(), "报告已写入");
        }
        None => println!("{}", content),
    }
    Ok(())
}
