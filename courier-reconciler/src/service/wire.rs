//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建对账服务的所有组件

use std::sync::Arc;

use anyhow::{Context, Result};
use courier_core::config::CourierAppConfig;
use courier_core::metrics::ReconcilerMetrics;
use courier_core::utils::connect_postgres;
use tracing::info;

use crate::application::handlers::DeliveryBatchHandler;
use crate::config::ReconcilerConfig;
use crate::domain::service::DeliveryReconciler;
use crate::infrastructure::persistence::PostgresMessageStatusRepository;
use crate::interface::messaging::DeliveryReconcilerConsumer;

/// 应用上下文
pub struct ApplicationContext {
    pub consumer: Arc<DeliveryReconcilerConsumer>,
    pub config: Arc<ReconcilerConfig>,
}

/// 构建应用上下文
pub async fn initialize(app_config: Option<&CourierAppConfig>) -> Result<ApplicationContext> {
    // 1. 加载配置
    let config = Arc::new(ReconcilerConfig::from_sources(app_config));

    // 2. 连接 PostgreSQL
    let pool = connect_postgres(&config.postgres, &config.retry)
        .await
        .context("Failed to create PostgreSQL pool")?;

    // 3. 指标
    let metrics = Arc::new(ReconcilerMetrics::new());

    // 4. 对账领域服务与批次处理器
    let reconciler = DeliveryReconciler::new(Arc::new(PostgresMessageStatusRepository::new(pool)));
    let batch_handler = Arc::new(DeliveryBatchHandler::new(reconciler, Arc::clone(&metrics)));

    // 5. Kafka 消费者（订阅失败即启动失败）
    let consumer = Arc::new(
        DeliveryReconcilerConsumer::new(Arc::clone(&config), batch_handler, metrics)
            .context("Failed to create reconciler consumer")?,
    );

    info!(
        service = %config.service_name,
        topic = %config.topic,
        group = %config.consumer_group,
        "reconciler context initialized"
    );

    Ok(ApplicationContext { consumer, config })
}
