//! 分区批次处理器 - 逐条解码、对账、解决偏移量，最后只提交已解决的偏移量

use std::sync::Arc;
use std::time::Instant;

use courier_core::metrics::ReconcilerMetrics;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::model::{DeliveryEvent, decode_events};
use crate::domain::repository::BatchControl;
use crate::domain::service::{DeliveryReconciler, ReconcileOutcome};

/// 与 Broker 客户端解耦的单条记录
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// 同一分区内按偏移量递增排列的一批记录
#[derive(Debug, Clone)]
pub struct PartitionBatch {
    pub topic: String,
    pub partition: i32,
    pub records: Vec<BatchRecord>,
}

/// 批次处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// 本批次解决的偏移量数
    pub resolved: usize,
    /// 未解决尾部的第一个偏移量，需要回退重投
    pub retry_from: Option<i64>,
    /// 因停止或分区撤销而提前结束
    pub interrupted: bool,
}

/// 单条记录的处理结论
enum RecordOutcome {
    Resolved,
    Unresolved(&'static str),
}

pub struct DeliveryBatchHandler {
    reconciler: DeliveryReconciler,
    metrics: Arc<ReconcilerMetrics>,
}

impl DeliveryBatchHandler {
    pub fn new(reconciler: DeliveryReconciler, metrics: Arc<ReconcilerMetrics>) -> Self {
        Self {
            reconciler,
            metrics,
        }
    }

    #[instrument(
        skip(self, batch, control),
        fields(topic = %batch.topic, partition = batch.partition, batch_size = batch.records.len())
    )]
    pub async fn process_batch(
        &self,
        batch: &PartitionBatch,
        control: &dyn BatchControl,
    ) -> BatchOutcome {
        let started = Instant::now();
        self.metrics.batch_size.observe(batch.records.len() as f64);

        control.heartbeat();

        let mut outcome = BatchOutcome::default();
        let mut last_resolved: Option<i64> = None;

        for record in &batch.records {
            if !control.is_running() {
                info!(offset = record.offset, "consumer stopped; leaving rest of batch unresolved");
                outcome.interrupted = true;
                break;
            }
            if control.is_stale() {
                warn!(offset = record.offset, "partition revoked; abandoning stale batch");
                self.metrics.stale_batches_total.inc();
                outcome.interrupted = true;
                break;
            }

            match self.process_record(record).await {
                RecordOutcome::Resolved => {
                    control.resolve_offset(record.offset);
                    control.heartbeat();
                    outcome.resolved += 1;
                    last_resolved = Some(record.offset);
                    self.metrics
                        .records_processed_total
                        .with_label_values(&["resolved"])
                        .inc();
                }
                RecordOutcome::Unresolved(reason) => {
                    self.metrics
                        .records_processed_total
                        .with_label_values(&[reason])
                        .inc();
                }
            }
        }

        if let Err(err) = control.commit_offsets_if_necessary() {
            self.metrics.commit_failures_total.inc();
            error!(error = %err, "failed to commit resolved offsets");
        }

        if !outcome.interrupted {
            outcome.retry_from = batch
                .records
                .iter()
                .map(|record| record.offset)
                .find(|offset| last_resolved.is_none_or(|last| *offset > last));
        }

        let unresolved = batch.records.len() - outcome.resolved;
        self.metrics.unresolved_records.set(unresolved as i64);
        self.metrics
            .batch_duration_seconds
            .observe(started.elapsed().as_secs_f64());

        debug!(
            resolved = outcome.resolved,
            unresolved,
            retry_from = ?outcome.retry_from,
            "partition batch processed"
        );
        outcome
    }

    async fn process_record(&self, record: &BatchRecord) -> RecordOutcome {
        let events = match decode_events(record.payload.as_deref()) {
            Ok(events) => events,
            Err(err) => {
                warn!(offset = record.offset, error = %err, "skipping undecodable record");
                return RecordOutcome::Unresolved("undecodable");
            }
        };

        for event in &events {
            match self.reconcile_event(record.offset, event).await {
                RecordOutcome::Resolved => {}
                unresolved => return unresolved,
            }
        }
        RecordOutcome::Resolved
    }

    async fn reconcile_event(&self, offset: i64, event: &DeliveryEvent) -> RecordOutcome {
        match self.reconciler.reconcile(event).await {
            Ok(outcome) if outcome.is_resolved() => RecordOutcome::Resolved,
            Ok(ReconcileOutcome::Conflict) => {
                self.metrics.update_conflicts_total.inc();
                RecordOutcome::Unresolved(ReconcileOutcome::Conflict.as_str())
            }
            Ok(outcome) => RecordOutcome::Unresolved(outcome.as_str()),
            Err(err) => {
                error!(
                    offset,
                    message_id = %event.message_id,
                    error = %err,
                    "failed to reconcile delivery event"
                );
                RecordOutcome::Unresolved("error")
            }
        }
    }
}
