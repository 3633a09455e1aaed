//! # Prometheus 指标收集模块
//!
//! 为分发服务与对账服务提供统一的 Prometheus 指标收集能力。

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 分发服务指标
pub struct DispatcherMetrics {
    /// 成功分发的消息总数
    pub messages_dispatched_total: IntCounter,
    /// 分发失败次数（按错误码）
    pub dispatch_failures_total: IntCounterVec,
    /// 单次分发（含批量）耗时（秒）
    pub dispatch_duration_seconds: Histogram,
    /// 单次分发的消息条数
    pub dispatch_batch_size: Histogram,
    /// Broker 已提交但存储提交失败的次数
    pub dispatch_inconsistent_total: IntCounter,
    /// 补偿步骤失败次数（按步骤）
    pub compensation_failures_total: IntCounterVec,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        let messages_dispatched_total = IntCounter::new(
            "courier_messages_dispatched_total",
            "Total number of messages stored and published",
        )
        .expect("Failed to create courier_messages_dispatched_total metric");

        let dispatch_failures_total = IntCounterVec::new(
            Opts::new(
                "courier_dispatch_failures_total",
                "Total number of failed dispatches",
            ),
            &["code"],
        )
        .expect("Failed to create courier_dispatch_failures_total metric");

        let dispatch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "courier_dispatch_duration_seconds",
                "Dispatch duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )
        .expect("Failed to create courier_dispatch_duration_seconds metric");

        let dispatch_batch_size = Histogram::with_opts(
            HistogramOpts::new(
                "courier_dispatch_batch_size",
                "Number of messages per dispatch",
            )
            .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0]),
        )
        .expect("Failed to create courier_dispatch_batch_size metric");

        let dispatch_inconsistent_total = IntCounter::new(
            "courier_dispatch_inconsistent_total",
            "Dispatches whose broker transaction committed but storage commit failed",
        )
        .expect("Failed to create courier_dispatch_inconsistent_total metric");

        let compensation_failures_total = IntCounterVec::new(
            Opts::new(
                "courier_compensation_failures_total",
                "Total number of failed compensation steps",
            ),
            &["step"],
        )
        .expect("Failed to create courier_compensation_failures_total metric");

        // 忽略重复注册错误（测试中可能重复创建）
        let _ = REGISTRY.register(Box::new(messages_dispatched_total.clone()));
        let _ = REGISTRY.register(Box::new(dispatch_failures_total.clone()));
        let _ = REGISTRY.register(Box::new(dispatch_duration_seconds.clone()));
        let _ = REGISTRY.register(Box::new(dispatch_batch_size.clone()));
        let _ = REGISTRY.register(Box::new(dispatch_inconsistent_total.clone()));
        let _ = REGISTRY.register(Box::new(compensation_failures_total.clone()));

        Self {
            messages_dispatched_total,
            dispatch_failures_total,
            dispatch_duration_seconds,
            dispatch_batch_size,
            dispatch_inconsistent_total,
            compensation_failures_total,
        }
    }
}

impl Default for DispatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 对账服务指标
pub struct ReconcilerMetrics {
    /// 处理的记录总数（按结果：delivered / converged / missing / skipped）
    pub records_processed_total: IntCounterVec,
    /// 单批记录数
    pub batch_size: Histogram,
    /// 单批处理耗时（秒）
    pub batch_duration_seconds: Histogram,
    /// 条件更新未生效（并发修改）的次数
    pub update_conflicts_total: IntCounter,
    /// 偏移量提交失败次数
    pub commit_failures_total: IntCounter,
    /// 因过期而放弃的批次数
    pub stale_batches_total: IntCounter,
    /// 当前未解决尾部的记录数
    pub unresolved_records: IntGauge,
    /// 超出重试预算后仍继续回退的次数
    pub tail_rewinds_over_budget_total: IntCounter,
}

impl ReconcilerMetrics {
    pub fn new() -> Self {
        let records_processed_total = IntCounterVec::new(
            Opts::new(
                "courier_reconciler_records_processed_total",
                "Total number of delivery events processed",
            ),
            &["outcome"],
        )
        .expect("Failed to create courier_reconciler_records_processed_total metric");

        let batch_size = Histogram::with_opts(
            HistogramOpts::new(
                "courier_reconciler_batch_size",
                "Number of records per partition batch",
            )
            .buckets(vec![1.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
        )
        .expect("Failed to create courier_reconciler_batch_size metric");

        let batch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "courier_reconciler_batch_duration_seconds",
                "Partition batch processing duration in seconds",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("Failed to create courier_reconciler_batch_duration_seconds metric");

        let update_conflicts_total = IntCounter::new(
            "courier_reconciler_update_conflicts_total",
            "Conditional status updates that matched no row",
        )
        .expect("Failed to create courier_reconciler_update_conflicts_total metric");

        let commit_failures_total = IntCounter::new(
            "courier_reconciler_commit_failures_total",
            "Total number of failed offset commits",
        )
        .expect("Failed to create courier_reconciler_commit_failures_total metric");

        let stale_batches_total = IntCounter::new(
            "courier_reconciler_stale_batches_total",
            "Batches abandoned because the partition was revoked",
        )
        .expect("Failed to create courier_reconciler_stale_batches_total metric");

        let unresolved_records = IntGauge::new(
            "courier_reconciler_unresolved_records",
            "Records left unresolved by the most recent batch",
        )
        .expect("Failed to create courier_reconciler_unresolved_records metric");

        let tail_rewinds_over_budget_total = IntCounter::new(
            "courier_reconciler_tail_rewinds_over_budget_total",
            "Unresolved tail rewinds beyond the configured retry budget",
        )
        .expect("Failed to create courier_reconciler_tail_rewinds_over_budget_total metric");

        let _ = REGISTRY.register(Box::new(records_processed_total.clone()));
        let _ = REGISTRY.register(Box::new(batch_size.clone()));
        let _ = REGISTRY.register(Box::new(batch_duration_seconds.clone()));
        let _ = REGISTRY.register(Box::new(update_conflicts_total.clone()));
        let _ = REGISTRY.register(Box::new(commit_failures_total.clone()));
        let _ = REGISTRY.register(Box::new(stale_batches_total.clone()));
        let _ = REGISTRY.register(Box::new(unresolved_records.clone()));
        let _ = REGISTRY.register(Box::new(tail_rewinds_over_budget_total.clone()));

        Self {
            records_processed_total,
            batch_size,
            batch_duration_seconds,
            update_conflicts_total,
            commit_failures_total,
            stale_batches_total,
            unresolved_records,
            tail_rewinds_over_budget_total,
        }
    }
}

impl Default for ReconcilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 获取 Prometheus 指标导出格式
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_can_be_created_twice() {
        let first = DispatcherMetrics::new();
        let second = DispatcherMetrics::default();
        first.messages_dispatched_total.inc();
        second.dispatch_failures_total.with_label_values(&["BROKER_FAILURE"]).inc();

        let reconciler = ReconcilerMetrics::new();
        reconciler
            .records_processed_total
            .with_label_values(&["delivered"])
            .inc_by(3);
        assert_eq!(
            reconciler
                .records_processed_total
                .with_label_values(&["delivered"])
                .get(),
            3
        );
    }

    #[test]
    fn test_gather_metrics_contains_registered_names() {
        let metrics = DispatcherMetrics::new();
        metrics.dispatch_inconsistent_total.inc();
        let output = gather_metrics();
        assert!(output.contains("courier_dispatch_inconsistent_total"));
    }
}
