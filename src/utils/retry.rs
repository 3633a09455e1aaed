//! 指数退避重试策略

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;

/// 指数退避重试策略（带上限）
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 从配置构建，缺失字段使用默认值
    pub fn from_config(config: Option<&RetryConfig>) -> Self {
        let default = Self::default();
        let Some(config) = config else {
            return default;
        };

        let initial_backoff = config
            .initial_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(default.initial_backoff);
        let max_backoff = config
            .max_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(default.max_backoff)
            .max(initial_backoff);

        Self {
            max_attempts: config.max_attempts.unwrap_or(default.max_attempts).max(1),
            initial_backoff,
            max_backoff,
            factor: config
                .factor
                .filter(|factor| *factor >= 1.0)
                .unwrap_or(default.factor),
        }
    }

    /// 第 `retry` 次重试前的等待时间（从 0 开始）
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let millis = self.initial_backoff.as_millis() as f64 * self.factor.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// 生产者原生重试次数
    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }
}

/// 按策略重试异步操作，返回最后一次的错误
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts => {
                let backoff = policy.backoff_for(attempt - 1);
                warn!(
                    operation = %operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            factor: 2.0,
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            factor: 2.0,
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(1000));
        assert_eq!(policy.retries(), 9);
    }

    #[test]
    fn test_from_config_fills_defaults() {
        let config = RetryConfig {
            max_attempts: Some(0),
            initial_backoff_ms: Some(500),
            max_backoff_ms: Some(200),
            factor: Some(0.5),
        };
        let policy = RetryPolicy::from_config(Some(&config));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        // 上限不低于初始退避
        assert_eq!(policy.max_backoff, Duration::from_millis(500));
        assert_eq!(policy.factor, 2.0);

        assert_eq!(RetryPolicy::from_config(None), RetryPolicy::default());
    }

    #[tokio::test]
    async fn test_retry_async_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_async(&fast_policy(3), "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("attempt {n} failed"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_async(&fast_policy(2), "broken", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {n}")) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "failure 1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
