//! 消息分发服务
//!
//! 将"写入存储"与"发布到 Broker"组合为一个逻辑单元（saga），并提供消息查询。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use application::handlers::{MessageCommandHandler, MessageQueryHandler};
pub use config::DispatcherConfig;
pub use domain::service::DispatchCoordinator;
