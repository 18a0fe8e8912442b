//! 写入重试策略：指数退避，带上限与单次超时。

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次）。
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// 单次写入超时，超时计为一次失败。
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_millis(10_000),
            attempt_timeout: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败（从 1 开始）后的等待时间：`base * 2^(attempt-1)`，不超过 cap。
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }

    pub(crate) fn sanitized(mut self) -> Self {
        if self.max_attempts == 0 {
            self.max_attempts = 1;
        }
        if self.backoff_cap < self.backoff_base {
            self.backoff_cap = self.backoff_base;
        }
        if self.attempt_timeout.is_zero() {
            self.attempt_timeout = Duration::from_millis(1);
        }
        self
    }
}
