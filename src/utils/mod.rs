//! 工具函数模块
//!
//! 提供重试策略与数据库连接池构建等通用工具

pub mod db;
pub mod retry;

pub use db::connect_postgres;
pub use retry::{RetryPolicy, retry_async};
