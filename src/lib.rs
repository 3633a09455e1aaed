//! Courier Core 公共库
//!
//! 提供统一的配置加载、错误模型、日志初始化、指标以及 Kafka / PostgreSQL 客户端构建能力

pub mod config;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod model;
pub mod tracing;
pub mod utils;

pub use config::{
    ConfigManager, CourierAppConfig, DispatcherServiceConfig, KafkaClusterConfig,
    LoggingConfig, PostgresInstanceConfig, ReconcilerServiceConfig, RetryConfig, app_config,
    load_config,
};
pub use error::*;
pub use model::{Message, MessageStatus, NewMessage};
pub use utils::*;
