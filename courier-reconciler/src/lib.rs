//! 投递状态对账服务
//!
//! 批量消费已发布的消息，将持久化状态幂等地推进到 delivered，只提交已解决的偏移量。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ReconcilerConfig;
pub use service::bootstrap::ApplicationBootstrap;
