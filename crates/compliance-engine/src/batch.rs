//! 批量评估编排
//!
//! 对选中的规则与记录做完整笛卡尔积，顺序固定为记录在外、规则在内。
//! 组合被切分为连续的分片在作用域线程中并行评估，按分片顺序拼接，
//! 因此输出顺序与并行度无关。

use crate::compiler::RuleCompiler;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::RuleExecutor;
use crate::labels;
use crate::models::{
    EvaluationVerdict, RecordDocument, RecordRef, RuleDocument, RuleRef, SourceDocument,
};
use crate::normalizer::{self, DocumentRole};
use crate::report::BatchReport;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// 批量评估器
#[derive(Debug, Clone)]
pub struct BatchEvaluator {
    config: EngineConfig,
    compiler: RuleCompiler,
    executor: RuleExecutor,
}

impl BatchEvaluator {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let compiler = RuleCompiler::from_config(&config)?;
        Ok(Self {
            config,
            compiler,
            executor: RuleExecutor::new(),
        })
    }

    /// 定位、标注并编译规则文档中的全部规则
    pub fn prepare_rules(&self, sources: &[SourceDocument]) -> Vec<RuleDocument> {
        let mut rules = Vec::new();

        for source in sources {
            let entries = normalizer::normalize(
                &source.content,
                DocumentRole::RuleSource,
                &self.config.normalizer,
            );
            let total = entries.len();
            debug!(source_id = source.id, source = %source.name, count = total, "规则已定位");

            for (index, entry) in entries.into_iter().enumerate() {
                let label = labels::label_or_fallback(
                    entry,
                    &self.config.labels.rule_label_keys,
                    &source.name,
                    index,
                    total,
                );
                rules.push(RuleDocument {
                    reference: RuleRef {
                        source_id: source.id,
                        source_name: source.name.clone(),
                        index,
                        label,
                    },
                    raw: entry.clone(),
                    root: self.compiler.compile_document(entry),
                });
            }
        }

        rules
    }

    /// 定位并标注记录文档中的全部记录
    pub fn prepare_records(&self, sources: &[SourceDocument]) -> Vec<RecordDocument> {
        let mut records = Vec::new();

        for source in sources {
            let entries = normalizer::normalize(
                &source.content,
                DocumentRole::RecordSource,
                &self.config.normalizer,
            );
            let total = entries.len();
            debug!(source_id = source.id, source = %source.name, count = total, "记录已定位");

            records.extend(entries.into_iter().enumerate().map(|(index, entry)| {
                RecordDocument {
                    reference: RecordRef {
                        source_id: source.id,
                        source_name: source.name.clone(),
                        index,
                        label: labels::label_or_fallback(
                            entry,
                            &self.config.labels.record_label_keys,
                            &source.name,
                            index,
                            total,
                        ),
                    },
                    data: entry.clone(),
                }
            }));
        }

        records
    }

    /// 评估所有 (记录, 规则) 组合，记录在外、规则在内
    #[instrument(skip_all, fields(rules = rules.len(), records = records.len()))]
    pub fn evaluate_batch(
        &self,
        rules: &[RuleDocument],
        records: &[RecordDocument],
    ) -> Vec<EvaluationVerdict> {
        let pairs = self.pairs(rules.len(), records.len());
        let workers = self.worker_count(pairs.len());
        debug!(pairs = pairs.len(), workers, "开始批量评估");

        let evaluate = |chunk: &[(usize, usize)]| -> Vec<EvaluationVerdict> {
            chunk
                .iter()
                .map(|&(record, rule)| self.executor.execute(&rules[rule], &records[record]))
                .collect()
        };

        let verdicts = if workers <= 1 {
            evaluate(&pairs)
        } else {
            let chunk_size = pairs.len().div_ceil(workers);
            thread::scope(|scope| {
                let handles: Vec<_> = pairs
                    .chunks(chunk_size)
                    .map(|chunk| scope.spawn(move || evaluate(chunk)))
                    .collect();

                // 按分片顺序拼接，保证输出顺序确定
                handles
                    .into_iter()
                    .flat_map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                    })
                    .collect()
            })
        };

        let failed = verdicts.iter().filter(|v| !v.passed).count();
        metrics::counter!("compliance_evaluations_total", "outcome" => "passed")
            .increment((verdicts.len() - failed) as u64);
        metrics::counter!("compliance_evaluations_total", "outcome" => "failed")
            .increment(failed as u64);

        verdicts
    }

    /// 完整流程：定位、编译、评估并汇总
    #[instrument(skip_all, fields(rule_sources = rule_sources.len(), record_sources = record_sources.len()))]
    pub fn run(
        &self,
        rule_sources: &[SourceDocument],
        record_sources: &[SourceDocument],
    ) -> BatchReport {
        let start = Instant::now();

        let rules = self.prepare_rules(rule_sources);
        let records = self.prepare_records(record_sources);
        let verdicts = self.evaluate_batch(&rules, &records);

        let mut report = BatchReport::from_verdicts(verdicts);
        report.stats.records = records.len();
        report.stats.rules = rules.len();
        report.stats.truncated = report.stats.evaluations < rules.len() * records.len();

        let elapsed = start.elapsed();
        report.stats.duration_ms = elapsed.as_millis() as i64;
        metrics::histogram!("compliance_batch_duration_seconds").record(elapsed.as_secs_f64());

        info!(
            records = report.stats.records,
            rules = report.stats.rules,
            evaluations = report.stats.evaluations,
            passed = report.stats.passed,
            failed = report.stats.failed,
            truncated = report.stats.truncated,
            duration_ms = report.stats.duration_ms,
            "批量评估完成"
        );

        report
    }

    /// 有序组合列表 (记录下标, 规则下标)，受 max_pairs 限制
    fn pairs(&self, rules: usize, records: usize) -> Vec<(usize, usize)> {
        let limit = self.config.batch.max_pairs.unwrap_or(usize::MAX);

        (0..records)
            .flat_map(|record| (0..rules).map(move |rule| (record, rule)))
            .take(limit)
            .collect()
    }

    fn worker_count(&self, pairs: usize) -> usize {
        let batch = &self.config.batch;
        let available = match batch.parallelism {
            0 => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        };
        let by_size = pairs / batch.min_pairs_per_worker.max(1);

        available.min(by_size).max(1)
    }
}
