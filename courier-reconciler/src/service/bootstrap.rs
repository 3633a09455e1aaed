//! 应用启动器 - 负责依赖注入和服务启动

use std::sync::Arc;

use anyhow::Result;
use courier_core::config::CourierAppConfig;
use tracing::{error, info};

use super::wire::{self, ApplicationContext};

/// 应用启动器
pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 运行应用的主入口点
    pub async fn run(config: &'static CourierAppConfig) -> Result<()> {
        let context = wire::initialize(Some(config)).await?;
        Self::start_consumer(context).await
    }

    /// 启动 Kafka 消费者，收到停止信号后等待当前记录处理完成
    pub async fn start_consumer(context: ApplicationContext) -> Result<()> {
        info!(service = %context.config.service_name, "reconciler started, consuming from kafka");

        let consumer = Arc::clone(&context.consumer);
        let signal = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown signal received");
                    consumer.stop();
                }
                Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
            }
        });

        let result = context.consumer.consume_messages().await;
        signal.abort();

        Self::graceful_shutdown(&context);

        if let Err(err) = &result {
            error!(error = %err, "reconciler consumer failed");
        }
        info!("reconciler stopped");
        result.map_err(anyhow::Error::from)
    }

    /// 优雅停机处理
    fn graceful_shutdown(context: &ApplicationContext) {
        context.consumer.shutdown();
    }
}
