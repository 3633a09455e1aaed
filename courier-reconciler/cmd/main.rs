use anyhow::Result;
use courier_core::tracing::init_tracing_from_config;

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = courier_core::load_config(std::env::var("COURIER_CONFIG").ok().as_deref());

    // 从配置初始化日志系统（RUST_LOG 优先）
    init_tracing_from_config(Some(&app_config.logging));

    courier_reconciler::ApplicationBootstrap::run(app_config).await
}
