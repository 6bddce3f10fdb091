//! Caller-side retry helpers
//!
//! The engine never retries on its own. Callers that want to re-attempt a
//! failed upload drive it through these helpers, which only retry failures
//! classified as retryable.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use crate::core::{Result, UploadError};

/// 重试策略
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// 固定延迟
    Fixed(Duration),
    /// 指数退避
    Exponential {
        initial: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
}

impl RetryStrategy {
    /// 计算第 n 次重试的延迟
    pub fn get_delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Fixed(delay) => *delay,
            RetryStrategy::Exponential { initial, multiplier, max_delay } => {
                let delay = initial.as_secs_f64() * multiplier.powf(attempt as f64);
                let delay = Duration::from_secs_f64(delay);
                std::cmp::min(delay, *max_delay)
            }
        }
    }
}

/// 重试配置
pub struct RetryConfig {
    /// 最大尝试次数
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    /// 是否重试的判断函数
    pub should_retry: Box<dyn Fn(&UploadError) -> bool + Send + Sync>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::Exponential {
                initial: Duration::from_secs(1),
                multiplier: 2.0,
                max_delay: Duration::from_secs(60),
            },
            should_retry: Box::new(UploadError::is_retryable),
        }
    }
}

impl RetryConfig {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// 执行带重试的操作
pub async fn retry_with_config<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= config.max_attempts || !(config.should_retry)(&error) {
                    return Err(error);
                }

                let delay = config.strategy.get_delay(attempt - 1);
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying upload");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> RetryConfig {
        RetryConfig::default().strategy(RetryStrategy::Fixed(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_retry_success() {
        let mut count = 0;
        let result = retry_with_config(fast(), || {
            count += 1;
            let attempt = count;
            async move {
                if attempt < 3 {
                    Err(UploadError::Timeout)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let mut count = 0;
        let result = retry_with_config(fast(), || {
            count += 1;
            async { Err::<(), _>(UploadError::Validation("File is empty".into())) }
        })
        .await;

        assert!(matches!(result, Err(UploadError::Validation(_))));
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let mut count = 0;
        let result = retry_with_config(fast().max_attempts(2), || {
            count += 1;
            async { Err::<(), _>(UploadError::Timeout) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(count, 2);
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let strategy = RetryStrategy::Exponential {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(strategy.get_delay(0), Duration::from_secs(1));
        assert_eq!(strategy.get_delay(2), Duration::from_secs(4));
        assert_eq!(strategy.get_delay(10), Duration::from_secs(5));
    }
}
