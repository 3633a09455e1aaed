use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::error::{Result, map_kafka_error};
use courier_core::kafka::{build_kafka_consumer, subscribe_topic};
use courier_core::metrics::ReconcilerMetrics;
use rdkafka::Message;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Offset;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::handlers::{BatchRecord, DeliveryBatchHandler, PartitionBatch};
use crate::config::ReconcilerConfig;
use crate::infrastructure::messaging::KafkaBatchControl;
use crate::interface::messaging::tail_retry::{RewindPlan, TailRetryTracker};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DeliveryReconcilerConsumer {
    config: Arc<ReconcilerConfig>,
    kafka_consumer: StreamConsumer,
    batch_handler: Arc<DeliveryBatchHandler>,
    metrics: Arc<ReconcilerMetrics>,
    running: AtomicBool,
    last_heartbeat_ms: AtomicI64,
}

impl DeliveryReconcilerConsumer {
    /// 创建消费者并订阅主题，失败即视为启动失败
    pub fn new(
        config: Arc<ReconcilerConfig>,
        batch_handler: Arc<DeliveryBatchHandler>,
        metrics: Arc<ReconcilerMetrics>,
    ) -> Result<Self> {
        let consumer = build_kafka_consumer(config.as_ref())
            .map_err(|err| map_kafka_error(err, "failed to build kafka consumer"))?;

        subscribe_topic(&consumer, &config.topic)
            .map_err(|err| map_kafka_error(err, "failed to subscribe kafka topic"))?;

        info!(
            bootstrap = %config.kafka_bootstrap,
            group = %config.consumer_group,
            topic = %config.topic,
            "reconciler kafka consumer subscribed"
        );

        Ok(Self {
            config,
            kafka_consumer: consumer,
            batch_handler,
            metrics,
            running: AtomicBool::new(true),
            last_heartbeat_ms: AtomicI64::new(0),
        })
    }

    /// 停止消费，当前记录处理完后退出循环
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 最近一次处理心跳的时间
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        match self.last_heartbeat_ms.load(Ordering::SeqCst) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    /// 离开消费组，分区交还给其他成员
    pub fn shutdown(&self) {
        self.stop();
        self.kafka_consumer.unsubscribe();
        info!(group = %self.config.consumer_group, "reconciler consumer left group");
    }

    pub async fn consume_messages(&self) -> Result<()> {
        info!(
            topic = %self.config.topic,
            group_id = %self.config.consumer_group,
            max_poll_records = self.config.max_poll_records,
            "starting reconciler consumer loop"
        );

        let mut tail_retries = TailRetryTracker::new(self.config.retry.clone());

        while self.is_running() {
            let batches = self.poll_batches().await?;
            if batches.is_empty() {
                continue;
            }

            // 分区之间顺序处理，分区内保持偏移量顺序
            for ((topic, partition), records) in batches {
                if !self.is_running() {
                    break;
                }
                let batch = PartitionBatch {
                    topic,
                    partition,
                    records,
                };
                let control = KafkaBatchControl::new(
                    &self.kafka_consumer,
                    &self.running,
                    &self.last_heartbeat_ms,
                    &batch.topic,
                    batch.partition,
                );
                let outcome = self.batch_handler.process_batch(&batch, &control).await;

                match outcome.retry_from {
                    Some(offset) => {
                        let plan = tail_retries.plan(&batch.topic, batch.partition, offset);
                        self.rewind_tail(&batch.topic, batch.partition, plan).await;
                    }
                    None => tail_retries.clear(&batch.topic, batch.partition),
                }
            }
        }

        info!("reconciler consumer loop stopped");
        Ok(())
    }

    /// 收集一批记录（最多 `max_poll_records` 条或等待 `fetch_max_wait_ms`），按分区分组
    async fn poll_batches(&self) -> Result<BTreeMap<(String, i32), Vec<BatchRecord>>> {
        let mut batches: BTreeMap<(String, i32), Vec<BatchRecord>> = BTreeMap::new();
        let deadline = Instant::now() + self.config.fetch_max_wait();
        let mut collected = 0usize;

        while collected < self.config.max_poll_records && self.is_running() {
            match tokio::time::timeout_at(deadline, self.kafka_consumer.recv()).await {
                Ok(Ok(message)) => {
                    debug!(
                        partition = message.partition(),
                        offset = message.offset(),
                        "received record"
                    );
                    batches
                        .entry((message.topic().to_string(), message.partition()))
                        .or_default()
                        .push(BatchRecord {
                            partition: message.partition(),
                            offset: message.offset(),
                            payload: message.payload().map(<[u8]>::to_vec),
                        });
                    collected += 1;
                }
                Ok(Err(err)) => {
                    error!(error = %err, "error receiving record from kafka");
                    return Err(map_kafka_error(err, "failed to receive kafka record"));
                }
                Err(_) => break,
            }
        }

        if collected > 0 {
            debug!(collected, partitions = batches.len(), "collected batch");
        }
        Ok(batches)
    }

    /// 退避后回退到未解决尾部的第一个偏移量
    ///
    /// 超出重试预算只告警，不放弃该偏移量，之后的已解决记录不会越过它提交。
    async fn rewind_tail(&self, topic: &str, partition: i32, plan: RewindPlan) {
        if plan.over_budget {
            self.metrics.tail_rewinds_over_budget_total.inc();
            warn!(
                topic,
                partition,
                offset = plan.offset,
                attempts = plan.attempts,
                "unresolved records still pending after retry budget; continuing to redeliver"
            );
        } else {
            debug!(
                topic,
                partition,
                offset = plan.offset,
                attempts = plan.attempts,
                backoff_ms = plan.backoff.as_millis() as u64,
                "rewinding unresolved tail"
            );
        }
        tokio::time::sleep(plan.backoff).await;

        if let Err(err) =
            self.kafka_consumer
                .seek(topic, partition, Offset::Offset(plan.offset), SEEK_TIMEOUT)
        {
            warn!(
                topic,
                partition,
                offset = plan.offset,
                error = %err,
                "failed to rewind partition"
            );
        }
    }
}
