//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建分发服务的所有组件

use std::sync::Arc;

use anyhow::{Context, Result};
use courier_core::config::CourierAppConfig;
use courier_core::kafka::build_kafka_producer;
use courier_core::metrics::DispatcherMetrics;
use courier_core::utils::connect_postgres;
use tracing::info;

use crate::application::handlers::{MessageCommandHandler, MessageQueryHandler};
use crate::config::DispatcherConfig;
use crate::domain::service::DispatchCoordinator;
use crate::infrastructure::messaging::KafkaMessagePublisher;
use crate::infrastructure::persistence::{PostgresMessageQueryRepository, PostgresMessageStore};

/// 应用上下文 - 供外部接入层（HTTP 等）使用
pub struct ApplicationContext {
    pub command_handler: Arc<MessageCommandHandler>,
    pub query_handler: Arc<MessageQueryHandler>,
    pub config: Arc<DispatcherConfig>,
}

/// 构建应用上下文
pub async fn initialize(app_config: Option<&CourierAppConfig>) -> Result<ApplicationContext> {
    // 1. 加载配置
    let config = Arc::new(DispatcherConfig::from_sources(app_config));

    // 2. 连接 PostgreSQL（失败按重试策略重试）
    let pool = connect_postgres(&config.postgres, &config.retry)
        .await
        .context("Failed to create PostgreSQL pool")?;

    // 3. 创建事务型 Kafka 生产者并初始化事务
    let producer = build_kafka_producer(config.as_ref())
        .context("Failed to create Kafka producer")?;
    let publisher = KafkaMessagePublisher::new(
        producer,
        config.send_timeout(),
        config.transaction_timeout(),
        &config.retry,
    )
    .await
    .context("Failed to initialize Kafka transactions")?;

    // 4. 指标
    let metrics = Arc::new(DispatcherMetrics::new());

    // 5. 分发协调器
    let coordinator = Arc::new(DispatchCoordinator::new(
        Arc::new(PostgresMessageStore::new(pool.clone())),
        Arc::new(publisher),
        config.topic.clone(),
        config.transaction_timeout(),
        metrics,
    ));

    // 6. CQRS handlers
    let command_handler = Arc::new(MessageCommandHandler::new(coordinator));
    let query_handler = Arc::new(MessageQueryHandler::new(Arc::new(
        PostgresMessageQueryRepository::new(pool),
    )));

    info!(
        service = %config.service_name,
        topic = %config.topic,
        transactional_id = %config.transactional_id,
        "dispatcher context initialized"
    );

    Ok(ApplicationContext {
        command_handler,
        query_handler,
        config,
    })
}
