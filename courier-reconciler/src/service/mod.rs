//! 服务模块 - 依赖构建与启动

pub mod bootstrap;
pub mod wire;

pub use wire::ApplicationContext;
