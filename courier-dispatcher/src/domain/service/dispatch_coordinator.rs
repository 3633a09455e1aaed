use std::sync::Arc;
use std::time::Duration;

use courier_core::error::{CourierError, Result};
use courier_core::metrics::DispatcherMetrics;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::model::{Message, NewMessage};
use crate::domain::repository::{MessagePublisher, MessageStore};
use crate::domain::service::saga::{DispatchSaga, transaction_timed_out};

/// 分发协调器
///
/// 把"写入存储"和"发布到 Broker"组合为对调用方原子的一个操作：
/// 1. 开启存储事务
/// 2. 开启 Broker 事务（写入与发布的截止时间从此刻开始计时）
/// 3. 在存储事务内写入
/// 4. 在 Broker 事务内发布完整的持久化记录
/// 5. 先提交 Broker，再提交存储
///
/// 第 3 步起任何失败都会执行补偿并返回单个已分类的错误。
pub struct DispatchCoordinator {
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
    transaction_timeout: Duration,
    metrics: Arc<DispatcherMetrics>,
}

impl DispatchCoordinator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        publisher: Arc<dyn MessagePublisher>,
        topic: impl Into<String>,
        transaction_timeout: Duration,
        metrics: Arc<DispatcherMetrics>,
    ) -> Self {
        Self {
            store,
            publisher,
            topic: topic.into(),
            transaction_timeout,
            metrics,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 分发单条消息
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn dispatch(&self, message: NewMessage) -> Result<Message> {
        let mut persisted = self.run(std::slice::from_ref(&message)).await?;
        persisted
            .pop()
            .ok_or_else(|| CourierError::internal("storage returned no record"))
    }

    /// 分发一批消息，全部成功或全部失败
    #[instrument(skip(self, messages), fields(batch_size = messages.len()))]
    pub async fn dispatch_batch(&self, messages: Vec<NewMessage>) -> Result<Vec<Message>> {
        if messages.is_empty() {
            return Err(CourierError::validation("messages array cannot be empty"));
        }
        self.run(&messages).await
    }

    async fn run(&self, messages: &[NewMessage]) -> Result<Vec<Message>> {
        let started = std::time::Instant::now();
        let result = self.execute(messages).await;

        self.metrics
            .dispatch_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(persisted) => {
                self.metrics.dispatch_batch_size.observe(persisted.len() as f64);
                self.metrics
                    .messages_dispatched_total
                    .inc_by(persisted.len() as u64);
                info!(
                    topic = %self.topic,
                    count = persisted.len(),
                    "messages stored and published"
                );
            }
            Err(err) => {
                self.metrics
                    .dispatch_failures_total
                    .with_label_values(&[err.code().as_str()])
                    .inc();
                warn!(
                    topic = %self.topic,
                    count = messages.len(),
                    code = %err.code(),
                    error = %err,
                    "dispatch failed"
                );
            }
        }
        result
    }

    async fn execute(&self, messages: &[NewMessage]) -> Result<Vec<Message>> {
        let mut saga = DispatchSaga::new(Arc::clone(&self.metrics));

        let storage = self.store.begin().await?;
        saga.storage_started(storage);

        let broker = match self.publisher.begin().await {
            Ok(broker) => broker,
            Err(err) => {
                saga.compensate().await;
                return Err(err);
            }
        };
        let deadline = Instant::now() + self.transaction_timeout;
        saga.broker_started(broker);
        debug!(topic = %self.topic, "storage and broker transactions started");

        let steps = async {
            let persisted = if let [message] = messages {
                vec![saga.storage()?.insert(message).await?]
            } else {
                saga.storage()?.bulk_insert(messages).await?
            };
            saga.broker()?.send(&self.topic, &persisted).await?;
            Ok::<_, CourierError>(persisted)
        };

        let outcome = match timeout_at(deadline, steps).await {
            Ok(result) => result,
            Err(_) => Err(transaction_timed_out()),
        };

        let persisted = match outcome {
            Ok(persisted) => persisted,
            Err(err) => {
                saga.compensate().await;
                return Err(err);
            }
        };

        let ids: Vec<Uuid> = persisted.iter().map(|message| message.id).collect();
        saga.commit(&ids).await?;
        Ok(persisted)
    }
}
