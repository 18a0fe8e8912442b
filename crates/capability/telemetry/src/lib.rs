//! 日志初始化与采集链路计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub raw_messages: u64,
    pub unroutable_messages: u64,
    pub metric_points: u64,
    pub alerts: u64,
    pub health_records: u64,
    pub devices_observed: u64,
    pub batches_flushed: u64,
    pub flush_retries: u64,
    pub batches_failed: u64,
    pub commits: u64,
    pub commit_failures: u64,
    pub flush_latency_ms_total: u64,
    pub flush_latency_ms_count: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    raw_messages: AtomicU64,
    unroutable_messages: AtomicU64,
    metric_points: AtomicU64,
    alerts: AtomicU64,
    health_records: AtomicU64,
    devices_observed: AtomicU64,
    batches_flushed: AtomicU64,
    flush_retries: AtomicU64,
    batches_failed: AtomicU64,
    commits: AtomicU64,
    commit_failures: AtomicU64,
    flush_latency_ms_total: AtomicU64,
    flush_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            raw_messages: AtomicU64::new(0),
            unroutable_messages: AtomicU64::new(0),
            metric_points: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
            health_records: AtomicU64::new(0),
            devices_observed: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            flush_retries: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            commit_failures: AtomicU64::new(0),
            flush_latency_ms_total: AtomicU64::new(0),
            flush_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            raw_messages: self.raw_messages.load(Ordering::Relaxed),
            unroutable_messages: self.unroutable_messages.load(Ordering::Relaxed),
            metric_points: self.metric_points.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            health_records: self.health_records.load(Ordering::Relaxed),
            devices_observed: self.devices_observed.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            flush_retries: self.flush_retries.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            flush_latency_ms_total: self.flush_latency_ms_total.load(Ordering::Relaxed),
            flush_latency_ms_count: self.flush_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing：RUST_LOG 优先，否则使用传入的默认级别。
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录收到的原始消息。
pub fn record_raw_message() {
    metrics().raw_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录无法路由 / 解码的消息。
pub fn record_unroutable() {
    metrics().unroutable_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录规范化输出数量。
pub fn record_normalized(metric_points: u64, alerts: u64, health_records: u64) {
    let metrics = metrics();
    metrics
        .metric_points
        .fetch_add(metric_points, Ordering::Relaxed);
    metrics.alerts.fetch_add(alerts, Ordering::Relaxed);
    metrics
        .health_records
        .fetch_add(health_records, Ordering::Relaxed);
}

/// 记录设备观察次数。
pub fn record_device_observed() {
    metrics().devices_observed.fetch_add(1, Ordering::Relaxed);
}

/// 记录批次写入成功与耗时（毫秒）。
pub fn record_batch_flushed(latency_ms: u64) {
    let metrics = metrics();
    metrics.batches_flushed.fetch_add(1, Ordering::Relaxed);
    metrics
        .flush_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .flush_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录批次写入重试。
pub fn record_flush_retry() {
    metrics().flush_retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录重试耗尽的批次（数据丢失风险）。
pub fn record_batch_failed() {
    metrics().batches_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录 offset 提交成功。
pub fn record_commit() {
    metrics().commits.fetch_add(1, Ordering::Relaxed);
}

/// 记录 offset 提交失败。
pub fn record_commit_failure() {
    metrics().commit_failures.fetch_add(1, Ordering::Relaxed);
}
