//! Kafka 客户端构建器
//!
//! 服务配置实现 `KafkaConsumerConfig` / `KafkaProducerConfig` 后，
//! 即可使用统一的构建函数创建消费者与事务型生产者。

use std::collections::HashMap;

use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::producer::FutureProducer;
use tracing::{debug, info};

/// 消费者配置
pub trait KafkaConsumerConfig {
    fn kafka_bootstrap(&self) -> &str;

    fn consumer_group(&self) -> &str;

    fn kafka_topic(&self) -> &str;

    fn client_id(&self) -> Option<&str> {
        None
    }

    fn session_timeout_ms(&self) -> u64 {
        30_000
    }

    fn heartbeat_interval_ms(&self) -> u64 {
        3_000
    }

    /// 对账依赖手动提交，默认关闭
    fn enable_auto_commit(&self) -> bool {
        false
    }

    fn auto_offset_reset(&self) -> &str {
        "earliest"
    }

    /// 只读取已提交的事务消息
    fn read_uncommitted(&self) -> bool {
        false
    }

    /// 透传给 librdkafka 的额外选项
    fn extra_options(&self) -> Option<&HashMap<String, String>> {
        None
    }
}

/// 生产者配置
pub trait KafkaProducerConfig {
    fn kafka_bootstrap(&self) -> &str;

    fn client_id(&self) -> Option<&str> {
        None
    }

    /// 设置后生产者以事务模式工作
    fn transactional_id(&self) -> Option<&str> {
        None
    }

    fn transaction_timeout_ms(&self) -> u64 {
        60_000
    }

    fn message_timeout_ms(&self) -> u64 {
        30_000
    }

    fn enable_idempotence(&self) -> bool {
        true
    }

    fn acks(&self) -> &str {
        "all"
    }

    fn compression_type(&self) -> &str {
        "gzip"
    }

    fn retries(&self) -> u32 {
        5
    }

    fn retry_backoff_ms(&self) -> u64 {
        100
    }

    fn retry_backoff_max_ms(&self) -> u64 {
        1_000
    }

    fn extra_options(&self) -> Option<&HashMap<String, String>> {
        None
    }
}

/// 生成消费者的 librdkafka 配置
pub fn consumer_client_config(config: &dyn KafkaConsumerConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.kafka_bootstrap())
        .set("group.id", config.consumer_group())
        .set("enable.auto.commit", config.enable_auto_commit().to_string())
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", config.auto_offset_reset())
        .set("session.timeout.ms", config.session_timeout_ms().to_string())
        .set(
            "heartbeat.interval.ms",
            config.heartbeat_interval_ms().to_string(),
        )
        .set(
            "isolation.level",
            if config.read_uncommitted() {
                "read_uncommitted"
            } else {
                "read_committed"
            },
        );

    if let Some(client_id) = config.client_id() {
        client.set("client.id", client_id);
    }
    apply_extra_options(&mut client, config.extra_options());
    client
}

/// 生成生产者的 librdkafka 配置
pub fn producer_client_config(config: &dyn KafkaProducerConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.kafka_bootstrap())
        .set("enable.idempotence", config.enable_idempotence().to_string())
        .set("acks", config.acks())
        .set("compression.type", config.compression_type())
        .set("retries", config.retries().to_string())
        .set("retry.backoff.ms", config.retry_backoff_ms().to_string())
        .set(
            "retry.backoff.max.ms",
            config.retry_backoff_max_ms().to_string(),
        );

    let mut message_timeout_ms = config.message_timeout_ms();
    if let Some(transactional_id) = config.transactional_id() {
        let transaction_timeout_ms = config.transaction_timeout_ms();
        // librdkafka 要求 message.timeout.ms <= transaction.timeout.ms
        message_timeout_ms = message_timeout_ms.min(transaction_timeout_ms);
        client
            .set("transactional.id", transactional_id)
            .set(
                "transaction.timeout.ms",
                transaction_timeout_ms.to_string(),
            );
    }
    client.set("message.timeout.ms", message_timeout_ms.to_string());

    if let Some(client_id) = config.client_id() {
        client.set("client.id", client_id);
    }
    apply_extra_options(&mut client, config.extra_options());
    client
}

fn apply_extra_options(client: &mut ClientConfig, options: Option<&HashMap<String, String>>) {
    if let Some(options) = options {
        for (key, value) in options {
            client.set(key.as_str(), value.as_str());
        }
    }
}

/// 构建消费者（手动提交）
pub fn build_kafka_consumer(config: &dyn KafkaConsumerConfig) -> KafkaResult<StreamConsumer> {
    let consumer: StreamConsumer = consumer_client_config(config).create()?;
    debug!(
        bootstrap = %config.kafka_bootstrap(),
        group = %config.consumer_group(),
        "Kafka consumer created"
    );
    Ok(consumer)
}

/// 构建生产者，配置了 transactional_id 时为事务型生产者（尚未调用 init_transactions）
pub fn build_kafka_producer(config: &dyn KafkaProducerConfig) -> KafkaResult<FutureProducer> {
    let producer: FutureProducer = producer_client_config(config).create()?;
    debug!(
        bootstrap = %config.kafka_bootstrap(),
        transactional_id = ?config.transactional_id(),
        "Kafka producer created"
    );
    Ok(producer)
}

/// 订阅主题，分区分配在后续拉取过程中完成
pub fn subscribe_topic(consumer: &StreamConsumer, topic: &str) -> KafkaResult<()> {
    consumer.subscribe(&[topic])?;
    info!(topic = %topic, "Subscribed to Kafka topic");
    Ok(())
}
