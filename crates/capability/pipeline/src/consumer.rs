//! 采集循环状态机
//!
//! `Idle → Polling → Batching → Flushing → Polling ...`，收到取消信号后进入
//! `ShuttingDown → Stopped`。
//!
//! 正确性约束：offset 只在对应数据写入成功后提交。写入成功但提交前崩溃会导致
//! 重新投递，由存储层的幂等写入吸收。

use crate::batch::Batch;
use crate::config::PipelineConfig;
use crate::registry::DeviceRegistry;
use crate::retry::RetryPolicy;
use crate::PipelineError;
use domain::RawMessage;
use ome_config::ExhaustedPolicy;
use ome_ingest::{IngestError, MessageSource};
use ome_normalize::Router;
use ome_storage::{SinkBatch, StorageError, StorageSink};
use ome_telemetry::{
    record_batch_failed, record_batch_flushed, record_commit, record_commit_failure,
    record_flush_retry, record_normalized, record_raw_message, record_unroutable,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 毒消息日志中保留的报文前缀长度。
const PREVIEW_BYTES: usize = 512;

/// 拉取出错后的等待时间。
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Batching,
    Flushing,
    ShuttingDown,
    Stopped,
}

/// 循环结束时的统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub messages: u64,
    pub unroutable: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
}

pub struct ConsumerLoop {
    source: Box<dyn MessageSource>,
    sink: Arc<dyn StorageSink>,
    router: Router,
    registry: DeviceRegistry,
    config: PipelineConfig,
    batch: Batch,
    state: LoopState,
    report: LoopReport,
}

impl ConsumerLoop {
    pub fn new(
        source: Box<dyn MessageSource>,
        sink: Arc<dyn StorageSink>,
        router: Router,
        config: PipelineConfig,
    ) -> Self {
        Self::with_registry(source, sink, router, DeviceRegistry::new(), config)
    }

    pub fn with_registry(
        source: Box<dyn MessageSource>,
        sink: Arc<dyn StorageSink>,
        router: Router,
        registry: DeviceRegistry,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            sink,
            router,
            registry,
            config: config.sanitized(),
            batch: Batch::new(),
            state: LoopState::Idle,
            report: LoopReport::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn report(&self) -> LoopReport {
        self.report
    }

    /// 运行直到取消或出现致命错误。
    ///
    /// 退出前写入未完成的批次并释放订阅；`Halt` 策略下的失败批次不会被再次写入或提交。
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<LoopReport, PipelineError> {
        info!(
            target: "ome.pipeline",
            batch_max_records = self.config.batch_max_records,
            batch_max_interval_ms = self.config.batch_max_interval.as_millis() as u64,
            exhausted_policy = ?self.config.exhausted_policy,
            "consumer_loop_started"
        );
        let outcome = self.poll_loop(&cancel).await;

        self.transition(LoopState::ShuttingDown);
        let outcome = match outcome {
            Ok(()) => self.drain().await,
            Err(err) => Err(err),
        };
        if let Err(err) = self.source.close().await {
            warn!(target: "ome.pipeline", error = %err, "source_close_failed");
        }
        self.transition(LoopState::Stopped);
        info!(
            target: "ome.pipeline",
            messages = self.report.messages,
            unroutable = self.report.unroutable,
            batches_flushed = self.report.batches_flushed,
            batches_failed = self.report.batches_failed,
            "consumer_loop_stopped"
        );
        outcome.map(|()| self.report)
    }

    async fn poll_loop(&mut self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.transition(LoopState::Polling);

            let timeout = self
                .batch
                .remaining(self.config.batch_max_interval)
                .map(|remaining| remaining.min(self.config.poll_timeout))
                .unwrap_or(self.config.poll_timeout)
                .max(Duration::from_millis(1));
            let max_messages = self
                .config
                .batch_max_records
                .saturating_sub(self.batch.record_count())
                .max(1);

            let polled = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                polled = self.source.poll(max_messages, timeout) => polled,
            };
            self.drop_revoked();
            match polled {
                Ok(messages) => {
                    for message in messages {
                        self.transition(LoopState::Batching);
                        self.handle_message(message);
                        if self.batch.record_count() >= self.config.batch_max_records {
                            self.flush().await?;
                        }
                    }
                }
                Err(IngestError::Closed) => return Err(PipelineError::Ingest(IngestError::Closed)),
                Err(err) => {
                    warn!(target: "ome.pipeline", error = %err, "poll_failed");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }

            if self
                .batch
                .should_flush(self.config.batch_max_records, self.config.batch_max_interval)
            {
                self.flush().await?;
            }
        }
    }

    /// 路由并规范化一条消息；无法路由的消息记录后跳过，offset 照常登记。
    fn handle_message(&mut self, message: RawMessage) {
        record_raw_message();
        self.report.messages += 1;
        let position = message.position();
        match self.router.normalize(&message) {
            Ok(normalized) => {
                debug!(
                    target: "ome.pipeline",
                    kind = normalized.kind.as_str(),
                    topic = %message.topic,
                    offset = message.offset,
                    records = normalized.metrics.len() + normalized.alerts.len() + normalized.health.len(),
                    "message_normalized"
                );
                record_normalized(
                    normalized.metrics.len() as u64,
                    normalized.alerts.len() as u64,
                    normalized.health.len() as u64,
                );
                for fragment in &normalized.devices {
                    self.registry.observe(fragment);
                }
                self.batch.absorb(normalized);
            }
            Err(err) => {
                record_unroutable();
                self.report.unroutable += 1;
                self.batch.poison += 1;
                let preview_len = message.payload.len().min(PREVIEW_BYTES);
                warn!(
                    target: "ome.pipeline",
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    payload_size = message.payload.len(),
                    payload_preview = %String::from_utf8_lossy(&message.payload[..preview_len]),
                    error = %err,
                    "message_unroutable"
                );
            }
        }
        self.batch.track(&position);
    }

    /// 再均衡撤销的分区已归其他成员，丢弃其待提交位置，已取出的记录照常写入。
    fn drop_revoked(&mut self) {
        let revoked = self.source.take_revoked();
        if revoked.is_empty() {
            return;
        }
        let dropped = self.batch.offsets.forget(&revoked);
        info!(
            target: "ome.pipeline",
            revoked = ?revoked,
            dropped,
            "revoked_partition_offsets_dropped"
        );
    }

    /// 关闭前写入剩余批次。
    async fn drain(&mut self) -> Result<(), PipelineError> {
        if !self.batch.has_pending() {
            return Ok(());
        }
        self.flush().await?;
        if self.batch.offsets.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Commit(
                "offsets left uncommitted at shutdown".to_string(),
            ))
        }
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        self.drop_revoked();
        if !self.batch.has_pending() {
            return Ok(());
        }
        self.transition(LoopState::Flushing);

        let poison = self.batch.poison;
        let (metrics, alerts, health) = self.batch.take_records();
        let sink_batch = SinkBatch {
            devices: self.registry.dirty_devices(),
            metrics,
            alerts,
            health,
        };
        let offsets = self.batch.offsets.to_commit();

        if !sink_batch.is_empty() {
            let started_at = Instant::now();
            match write_with_retry(self.sink.as_ref(), &self.config.retry, &sink_batch).await {
                Ok(attempts) => {
                    let latency_ms = started_at.elapsed().as_millis() as u64;
                    record_batch_flushed(latency_ms);
                    self.report.batches_flushed += 1;
                    self.registry.mark_clean(&sink_batch.devices);
                    info!(
                        target: "ome.pipeline",
                        records = sink_batch.record_count(),
                        devices = sink_batch.devices.len(),
                        poison,
                        attempts,
                        latency_ms,
                        "batch_flushed"
                    );
                }
                Err((attempts, err)) => {
                    record_batch_failed();
                    self.report.batches_failed += 1;
                    error!(
                        target: "ome.pipeline",
                        records = sink_batch.record_count(),
                        devices = sink_batch.devices.len(),
                        attempts,
                        offsets = ?offsets,
                        policy = ?self.config.exhausted_policy,
                        error = %err,
                        "batch_failed"
                    );
                    if self.config.exhausted_policy == ExhaustedPolicy::Halt {
                        return Err(PipelineError::SinkExhausted { attempts, error: err });
                    }
                }
            }
        }

        match self.source.commit(&offsets).await {
            Ok(()) => {
                record_commit();
                self.batch.committed();
                debug!(target: "ome.pipeline", offsets = ?offsets, "offsets_committed");
            }
            Err(err) => {
                // 数据已落库，保留 offset 到下一批再提交。
                record_commit_failure();
                self.batch.restart_timer();
                warn!(target: "ome.pipeline", offsets = ?offsets, error = %err, "commit_failed");
            }
        }
        self.transition(LoopState::Polling);
        Ok(())
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!(target: "ome.pipeline", from = ?self.state, to = ?next, "state_transition");
            self.state = next;
        }
    }
}

/// 整批写入，失败按指数退避重试；返回成功时的尝试次数。
async fn write_with_retry(
    sink: &dyn StorageSink,
    policy: &RetryPolicy,
    batch: &SinkBatch,
) -> Result<u32, (u32, StorageError)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.attempt_timeout, sink.write_batch(batch)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(policy.attempt_timeout.as_millis() as u64)),
        };
        match result {
            Ok(()) => return Ok(attempt),
            Err(err) if attempt >= policy.max_attempts => return Err((attempt, err)),
            Err(err) => {
                record_flush_retry();
                let delay = policy.backoff(attempt);
                warn!(
                    target: "ome.pipeline",
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "batch_flush_retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
