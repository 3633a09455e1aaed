//! Kafka 事务型消息发布器
//!
//! 生产者在进程内共享；事务身份由异步互斥锁串行化，锁守卫保存在事务句柄中，
//! 直到提交或中止。`init/commit/abort_transaction` 为阻塞调用，放到 blocking 线程池执行。
//! 提交时锁守卫随阻塞任务一起移动，调用方被取消也不会在提交进行中释放事务身份。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::error::{ErrorBuilder, ErrorCode, InfraResultExt, Result, map_kafka_error};
use courier_core::utils::{RetryPolicy, retry_async};
use futures::FutureExt;
use futures::future::try_join_all;
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::domain::model::{Message, SendReceipt};
use crate::domain::repository::{BrokerCommit, BrokerTransaction, MessagePublisher};

const CONTENT_TYPE: &str = "application/json";

/// Kafka 事务型发布器
pub struct KafkaMessagePublisher {
    producer: Arc<FutureProducer>,
    transaction_lock: Arc<Mutex<()>>,
    send_timeout: Duration,
    transaction_timeout: Duration,
}

impl KafkaMessagePublisher {
    /// 初始化事务（按重试策略重试），之后才能开启事务
    pub async fn new(
        producer: FutureProducer,
        send_timeout: Duration,
        transaction_timeout: Duration,
        retry: &RetryPolicy,
    ) -> Result<Self> {
        let producer = Arc::new(producer);

        retry_async(retry, "kafka_init_transactions", || {
            run_blocking(
                &producer,
                "failed to initialize producer transactions",
                move |producer| producer.init_transactions(transaction_timeout),
            )
        })
        .await?;

        info!(
            transaction_timeout_ms = transaction_timeout.as_millis() as u64,
            "Kafka transactional producer initialized"
        );

        Ok(Self {
            producer,
            transaction_lock: Arc::new(Mutex::new(())),
            send_timeout,
            transaction_timeout,
        })
    }
}

#[async_trait]
impl MessagePublisher for KafkaMessagePublisher {
    async fn begin(&self) -> Result<Box<dyn BrokerTransaction>> {
        let guard = Arc::clone(&self.transaction_lock).lock_owned().await;
        self.producer
            .begin_transaction()
            .map_err(|err| map_kafka_error(err, "failed to begin broker transaction"))?;
        debug!("broker transaction started");

        Ok(Box::new(KafkaBrokerTransaction {
            producer: Arc::clone(&self.producer),
            send_timeout: self.send_timeout,
            transaction_timeout: self.transaction_timeout,
            guard: Some(guard),
        }))
    }
}

/// 打开中的 Broker 事务；`guard` 为 None 表示已提交或已中止
struct KafkaBrokerTransaction {
    producer: Arc<FutureProducer>,
    send_timeout: Duration,
    transaction_timeout: Duration,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KafkaBrokerTransaction {
    async fn abort_inner(&mut self) -> Result<()> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        let timeout = self.transaction_timeout;
        run_blocking(
            &self.producer,
            "failed to abort broker transaction",
            move |producer| {
                let result = producer.abort_transaction(timeout);
                drop(guard);
                result
            },
        )
        .await
    }
}

#[async_trait]
impl BrokerTransaction for KafkaBrokerTransaction {
    async fn send(&mut self, topic: &str, messages: &[Message]) -> Result<SendReceipt> {
        let encoded = messages
            .iter()
            .map(|message| {
                serde_json::to_vec(message).map(|payload| (message.id.to_string(), payload))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .into_courier(ErrorCode::Internal, "failed to encode message")?;

        let sends = encoded.iter().map(|(key, payload)| {
            let record = FutureRecord::to(topic)
                .key(key.as_str())
                .payload(payload.as_slice())
                .headers(OwnedHeaders::new().insert(Header {
                    key: "content-type",
                    value: Some(CONTENT_TYPE),
                }));
            self.producer
                .send(record, self.send_timeout)
                .map(|result| {
                    result
                        .map(|_| ())
                        .map_err(|(err, _)| map_kafka_error(err, "failed to publish message"))
                })
        });
        try_join_all(sends).await?;

        debug!(topic = %topic, count = messages.len(), "records sent in broker transaction");
        Ok(SendReceipt {
            topic: topic.to_string(),
            record_count: messages.len(),
        })
    }

    /// 提交失败且需要中止时，在同一阻塞任务内中止后再释放锁
    async fn commit(mut self: Box<Self>) -> Result<BrokerCommit> {
        let Some(guard) = self.guard.take() else {
            return Err(ErrorBuilder::new(ErrorCode::Internal, "broker transaction already finished")
                .build_error());
        };
        let producer = Arc::clone(&self.producer);
        let timeout = self.transaction_timeout;

        let joined = tokio::task::spawn_blocking(move || {
            let outcome = match producer.commit_transaction(timeout) {
                Ok(()) => CommitAttempt::Committed,
                Err(err) if requires_abort(&err) => {
                    let abort = producer.abort_transaction(timeout).err();
                    CommitAttempt::Aborted { err, abort }
                }
                Err(err) => CommitAttempt::Unknown(err),
            };
            drop(guard);
            outcome
        })
        .await;

        match joined {
            Ok(CommitAttempt::Committed) => Ok(BrokerCommit::Committed),
            Ok(CommitAttempt::Aborted { err, abort }) => {
                if let Some(abort_err) = abort {
                    warn!(error = %abort_err, "failed to abort after commit failure");
                }
                Err(map_kafka_error(err, "failed to commit broker transaction"))
            }
            Ok(CommitAttempt::Unknown(err)) => Ok(BrokerCommit::OutcomeUnknown(map_kafka_error(
                err,
                "broker transaction commit outcome unknown",
            ))),
            Err(join_err) => Ok(BrokerCommit::OutcomeUnknown(
                ErrorBuilder::new(ErrorCode::Internal, "broker commit task failed")
                    .details(join_err.to_string())
                    .build_error(),
            )),
        }
    }

    async fn abort(mut self: Box<Self>) -> Result<()> {
        self.abort_inner().await
    }
}

impl Drop for KafkaBrokerTransaction {
    fn drop(&mut self) {
        // 未提交也未中止（例如超时取消）时在后台中止，锁在中止完成后释放
        let Some(guard) = self.guard.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("broker transaction dropped outside of a runtime; left open");
            return;
        };
        let producer = Arc::clone(&self.producer);
        let timeout = self.transaction_timeout;
        handle.spawn_blocking(move || {
            if let Err(err) = producer.abort_transaction(timeout) {
                warn!(error = %err, "failed to abort dropped broker transaction");
            }
            drop(guard);
        });
    }
}

enum CommitAttempt {
    Committed,
    Aborted {
        err: KafkaError,
        abort: Option<KafkaError>,
    },
    Unknown(KafkaError),
}

/// 只有 librdkafka 明确要求中止的提交失败才确定未提交
fn requires_abort(err: &KafkaError) -> bool {
    match err {
        KafkaError::Transaction(err) => err.txn_requires_abort(),
        _ => false,
    }
}

async fn run_blocking<F>(producer: &Arc<FutureProducer>, reason: &str, op: F) -> Result<()>
where
    F: FnOnce(&FutureProducer) -> KafkaResult<()> + Send + 'static,
{
    let producer = Arc::clone(producer);
    match tokio::task::spawn_blocking(move || op(&producer)).await {
        Ok(result) => result.map_err(|err| map_kafka_error(err, reason)),
        Err(join_err) => Err(ErrorBuilder::new(ErrorCode::Internal, reason)
            .details(join_err.to_string())
            .build_error()),
    }
}
