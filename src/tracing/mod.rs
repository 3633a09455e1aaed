//! 日志初始化模块
//!
//! 为分发服务与对账服务提供统一的 tracing subscriber 初始化。

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// 从配置初始化日志系统
///
/// 优先使用环境变量 RUST_LOG，其次使用配置中的级别，均缺失时为 debug。
/// 重复初始化时静默忽略（测试中多次调用的场景）。
///
/// # 示例
/// ```rust,ignore
/// use courier_core::config::LoggingConfig;
///
/// init_tracing_from_config(None);
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     json: true,
///     ..Default::default()
/// };
/// init_tracing_from_config(Some(&config));
/// ```
pub fn init_tracing_from_config(logging_config: Option<&LoggingConfig>) {
    let default_config = LoggingConfig::default();
    let config = logging_config.unwrap_or(&default_config);
    let env_filter = resolve_env_filter(config);

    let builder = fmt::Subscriber::builder()
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_env_filter(env_filter);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already initialized: {err}");
    }
}

fn resolve_env_filter(config: &LoggingConfig) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("debug")),
    }
}
