//! 配置管理器 - 负责处理不同环境下的配置覆盖
//!
//! - 读取当前环境名称
//! - 加载 `config/environments/{env}.toml` 并合并到基础配置

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toml::Value;

use super::{CourierAppConfig, merge_value};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称
    ///
    /// 从环境变量 COURIER_ENV 获取，未设置时默认为 "development"
    pub fn get_environment() -> String {
        env::var("COURIER_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 根据环境加载特定配置并合并到基础配置中
    pub fn load_environment_config(base_config: &mut CourierAppConfig) -> Result<()> {
        let env = Self::get_environment();
        let env_config_path = format!("config/environments/{}.toml", env);
        Self::apply_overlay_file(base_config, Path::new(&env_config_path))
    }

    /// 将指定文件作为覆盖层合并，文件不存在时不做任何事
    pub fn apply_overlay_file(base_config: &mut CourierAppConfig, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read environment config: {}", path.display()))?;
        let overlay: Value = toml::from_str(&content)
            .with_context(|| format!("invalid environment config format: {}", path.display()))?;

        Self::apply_overlay(base_config, overlay)
    }

    /// 合并覆盖层：基础配置先转回 TOML 值再逐表合并，未出现在覆盖层中的字段保持不变
    pub fn apply_overlay(base_config: &mut CourierAppConfig, overlay: Value) -> Result<()> {
        let mut base = Value::try_from(&*base_config)
            .context("unable to serialize base configuration")?;
        merge_value(&mut base, overlay);
        *base_config = base
            .try_into()
            .context("invalid configuration after applying environment overlay")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_keeps_untouched_fields() {
        let mut cfg: CourierAppConfig = toml::from_str(
            r#"
            [kafka.primary]
            bootstrap_servers = "localhost:9092"

            [services.reconciler]
            topic = "messaging"
            consumer_group = "courier-reconciler"
            max_poll_records = 100
            "#,
        )
        .unwrap();

        let overlay: Value = toml::from_str(
            r#"
            [logging]
            level = "warn"

            [services.reconciler]
            max_poll_records = 500
            "#,
        )
        .unwrap();

        ConfigManager::apply_overlay(&mut cfg, overlay).unwrap();

        assert_eq!(cfg.logging.level, "warn");
        let reconciler = cfg.reconciler_service();
        assert_eq!(reconciler.max_poll_records, Some(500));
        assert_eq!(reconciler.topic.as_deref(), Some("messaging"));
        assert_eq!(reconciler.consumer_group.as_deref(), Some("courier-reconciler"));
        assert_eq!(
            cfg.kafka_profile("primary").unwrap().bootstrap_servers,
            "localhost:9092"
        );
    }

    #[test]
    fn test_missing_overlay_file_is_noop() {
        let mut cfg = CourierAppConfig::default();
        ConfigManager::apply_overlay_file(&mut cfg, Path::new("config/environments/none.toml"))
            .unwrap();
        assert!(cfg.services.dispatcher.is_none());
    }
}
