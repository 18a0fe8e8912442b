//! 采集循环参数

use crate::retry::RetryPolicy;
use ome_config::{AppConfig, ExhaustedPolicy};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 批内时序记录数达到该值立即写入。
    pub batch_max_records: usize,
    /// 批次自第一条消息起最长等待时间。
    pub batch_max_interval: Duration,
    /// 单次拉取的等待上限。
    pub poll_timeout: Duration,
    pub retry: RetryPolicy,
    pub exhausted_policy: ExhaustedPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_max_records: 500,
            batch_max_interval: Duration::from_millis(1000),
            poll_timeout: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
            exhausted_policy: ExhaustedPolicy::CommitAndContinue,
        }
    }
}

impl PipelineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            batch_max_records: config.batch_max_records,
            batch_max_interval: Duration::from_millis(config.batch_max_interval_ms),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            retry: RetryPolicy {
                max_attempts: config.sink_max_attempts,
                backoff_base: Duration::from_millis(config.sink_backoff_base_ms),
                backoff_cap: Duration::from_millis(config.sink_backoff_cap_ms),
                attempt_timeout: Duration::from_millis(config.sink_attempt_timeout_ms),
            },
            exhausted_policy: config.sink_exhausted_policy,
        }
    }

    pub(crate) fn sanitized(mut self) -> Self {
        if self.batch_max_records == 0 {
            self.batch_max_records = 1;
        }
        if self.batch_max_interval.is_zero() {
            self.batch_max_interval = Duration::from_millis(1);
        }
        if self.poll_timeout.is_zero() {
            self.poll_timeout = Duration::from_millis(1);
        }
        self.retry = self.retry.sanitized();
        self
    }
}
