use async_trait::async_trait;
use domain::{AlertRecord, DeviceRef, HealthRecord, HealthStatus, MetricPoint};
use ome_config::{ExhaustedPolicy, TopicBinding, TopicKind};
use ome_ingest::MemorySource;
use ome_normalize::Router;
use ome_normalize::timestamp::{MAX_TS_MS, MIN_TS_MS};
use ome_pipeline::{ConsumerLoop, LoopReport, LoopState, PipelineConfig, PipelineError, RetryPolicy};
use ome_storage::{InMemorySink, SinkBatch, StorageError, StorageSink};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const TELEMETRY: &str = "ome.telemetry";
const ALERTS: &str = "ome.alerts";
const HEALTH: &str = "ome.health";

fn router() -> Router {
    Router::new(&[
        TopicBinding {
            topic: TELEMETRY.to_string(),
            kind: Some(TopicKind::Telemetry),
        },
        TopicBinding {
            topic: ALERTS.to_string(),
            kind: Some(TopicKind::Alert),
        },
        TopicBinding {
            topic: HEALTH.to_string(),
            kind: Some(TopicKind::Health),
        },
    ])
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        batch_max_records: 50,
        batch_max_interval: Duration::from_millis(20),
        poll_timeout: Duration::from_millis(10),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(4),
            attempt_timeout: Duration::from_secs(2),
        },
        exhausted_policy: ExhaustedPolicy::CommitAndContinue,
    }
}

fn consumer(source: &MemorySource, sink: &Arc<InMemorySink>, config: PipelineConfig) -> ConsumerLoop {
    ConsumerLoop::new(Box::new(source.clone()), sink.clone(), router(), config)
}

fn temperature(device_id: &str, seconds: i64) -> String {
    json!({
        "device_id": device_id,
        "ts": 1_769_970_900 + seconds,
        "components": [{"name": "CPU1", "metrics": [{"name": "temp", "value": 45, "unit": "C"}]}]
    })
    .to_string()
}

/// 运行循环直到 `done` 成立（最长 5 秒）后取消。
async fn run_until<F>(consumer: &mut ConsumerLoop, done: F) -> Result<LoopReport, PipelineError>
where
    F: Fn() -> bool,
{
    let cancel = CancellationToken::new();
    let stopper = {
        let cancel = cancel.clone();
        async move {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !done() && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        }
    };
    let (result, ()) = tokio::join!(consumer.run(cancel.clone()), stopper);
    result
}

#[tokio::test]
async fn poison_message_does_not_block_the_partition() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    source.publish(HEALTH, "{not json");
    for index in 0..100 {
        let payload = json!({"DeviceId": format!("SVC{index}"), "HealthStatus": "ok"});
        source.publish(HEALTH, payload.to_string());
    }

    let mut consumer = consumer(&source, &sink, fast_config());
    let report = run_until(&mut consumer, || source.committed(HEALTH, 0) == Some(100))
        .await
        .unwrap();

    assert_eq!(source.committed(HEALTH, 0), Some(100));
    assert_eq!(report.messages, 101);
    assert_eq!(report.unroutable, 1);
    let counts = sink.counts();
    assert_eq!(counts.health, 100);
    assert_eq!(counts.devices, 100);
    assert!(sink.health().iter().all(|row| row.status == HealthStatus::Ok));
}

#[tokio::test]
async fn redelivery_after_lost_commit_is_idempotent() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    for index in 0..10 {
        source.publish(TELEMETRY, temperature("SVC1", index));
    }
    source.fail_next_commits(1_000);

    // 数据已写入，但 offset 一直提交失败。
    let mut first = consumer(&source, &sink, fast_config());
    let outcome = run_until(&mut first, || sink.counts().metrics == 10).await;
    assert!(matches!(outcome, Err(PipelineError::Commit(_))));
    assert_eq!(source.committed(TELEMETRY, 0), None);
    let before = sink.counts();

    source.fail_next_commits(0);
    source.restart();
    let mut second = consumer(&source, &sink, fast_config());
    run_until(&mut second, || source.committed(TELEMETRY, 0) == Some(9))
        .await
        .unwrap();

    assert_eq!(source.committed(TELEMETRY, 0), Some(9));
    assert_eq!(sink.counts(), before);
    assert_eq!(sink.counts().metrics, 10);
}

#[tokio::test]
async fn transient_sink_failures_are_retried() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    sink.fail_next_writes(2);
    source.publish(TELEMETRY, temperature("SVC1", 0));

    let mut consumer = consumer(&source, &sink, fast_config());
    let report = run_until(&mut consumer, || source.committed(TELEMETRY, 0) == Some(0))
        .await
        .unwrap();

    assert_eq!(sink.write_calls(), 3);
    assert_eq!(sink.counts().metrics, 1);
    assert_eq!(report.batches_flushed, 1);
    assert_eq!(report.batches_failed, 0);
}

#[tokio::test]
async fn exhausted_retries_commit_and_continue() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    sink.fail_next_writes(3);
    source.publish(TELEMETRY, temperature("SVC1", 0));

    let mut consumer = consumer(&source, &sink, fast_config());
    let report = run_until(&mut consumer, || source.committed(TELEMETRY, 0) == Some(0))
        .await
        .unwrap();

    assert_eq!(sink.write_calls(), 3);
    assert_eq!(sink.counts().metrics, 0);
    assert_eq!(report.batches_failed, 1);
    assert_eq!(source.committed(TELEMETRY, 0), Some(0));
}

#[tokio::test]
async fn exhausted_retries_halt_without_commit() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    sink.fail_next_writes(10);
    source.publish(TELEMETRY, temperature("SVC1", 0));

    let config = PipelineConfig {
        exhausted_policy: ExhaustedPolicy::Halt,
        ..fast_config()
    };
    let mut consumer = consumer(&source, &sink, config);
    let outcome = run_until(&mut consumer, || sink.write_calls() >= 3).await;

    assert!(matches!(
        outcome,
        Err(PipelineError::SinkExhausted { attempts: 3, .. })
    ));
    assert_eq!(source.committed(TELEMETRY, 0), None);
    assert_eq!(source.commit_calls(), 0);
    assert_eq!(consumer.state(), LoopState::Stopped);
    assert!(source.is_closed());
}

#[tokio::test]
async fn slow_writes_count_as_failed_attempts() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    sink.set_write_delay(Some(Duration::from_millis(500)));
    source.publish(TELEMETRY, temperature("SVC1", 0));

    let config = PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(20),
        },
        ..fast_config()
    };
    let mut consumer = consumer(&source, &sink, config);
    let report = run_until(&mut consumer, || source.committed(TELEMETRY, 0) == Some(0))
        .await
        .unwrap();

    assert_eq!(sink.write_calls(), 2);
    assert_eq!(sink.counts().metrics, 0);
    assert_eq!(report.batches_failed, 1);
}

#[tokio::test]
async fn partial_batch_flushes_when_interval_elapses() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    for index in 0..3 {
        source.publish(TELEMETRY, temperature("SVC1", index));
    }

    let config = PipelineConfig {
        batch_max_records: 1_000,
        batch_max_interval: Duration::from_millis(30),
        ..fast_config()
    };
    let mut consumer = consumer(&source, &sink, config);
    let report = run_until(&mut consumer, || source.committed(TELEMETRY, 0) == Some(2))
        .await
        .unwrap();

    assert_eq!(report.batches_flushed, 1);
    assert_eq!(sink.write_calls(), 1);
    assert_eq!(sink.counts().metrics, 3);
}

#[tokio::test]
async fn full_batch_flushes_before_interval() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    for index in 0..4 {
        source.publish(TELEMETRY, temperature("SVC1", index));
    }

    let config = PipelineConfig {
        batch_max_records: 2,
        batch_max_interval: Duration::from_secs(60),
        ..fast_config()
    };
    let mut consumer = consumer(&source, &sink, config);
    let report = run_until(&mut consumer, || source.committed(TELEMETRY, 0) == Some(3))
        .await
        .unwrap();

    assert_eq!(report.batches_flushed, 2);
    assert_eq!(sink.counts().metrics, 4);
}

#[tokio::test]
async fn failed_commit_is_retried_with_next_flush() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    source.fail_next_commits(1);
    source.publish(TELEMETRY, temperature("SVC1", 0));

    let mut consumer = consumer(&source, &sink, fast_config());
    run_until(&mut consumer, || source.committed(TELEMETRY, 0) == Some(0))
        .await
        .unwrap();

    assert_eq!(source.committed(TELEMETRY, 0), Some(0));
    assert!(source.commit_calls() >= 2);
    // 第二次只提交 offset，不再写入。
    assert_eq!(sink.write_calls(), 1);
}

#[tokio::test]
async fn shutdown_drains_pending_batch_and_closes_source() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    source.publish(TELEMETRY, temperature("SVC1", 0));
    source.publish(TELEMETRY, temperature("SVC1", 1));

    let config = PipelineConfig {
        batch_max_records: 1_000,
        batch_max_interval: Duration::from_secs(60),
        ..fast_config()
    };
    let mut consumer = consumer(&source, &sink, config);
    assert_eq!(consumer.state(), LoopState::Idle);
    let report = run_until(&mut consumer, || source.pending() == 0).await.unwrap();

    assert_eq!(report.messages, 2);
    assert_eq!(sink.counts().metrics, 2);
    assert_eq!(source.committed(TELEMETRY, 0), Some(1));
    assert_eq!(consumer.state(), LoopState::Stopped);
    assert!(source.is_closed());
}

#[tokio::test]
async fn events_for_one_device_share_a_registry_entry() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    let telemetry = json!({
        "device_id": "SVC123",
        "device_name": "web-01",
        "model": "PowerEdge R750",
        "ts": "2026-02-01T18:35:00Z",
        "components": [{"name": "CPU1", "metrics": [{"name": "temp", "value": 45, "unit": "C"}]}]
    });
    let alert = json!({
        "DeviceId": "SVC123",
        "Severity": 16,
        "Message": "CPU1 temperature above threshold",
        "TimeStamp": "2026-02-01T18:36:00Z"
    });
    let health = json!({
        "DeviceId": "SVC123",
        "DeviceName": "",
        "HealthStatus": "Critical",
        "Timestamp": "2026-02-01T18:37:00Z"
    });
    source.publish(TELEMETRY, telemetry.to_string());
    source.publish(ALERTS, alert.to_string());
    source.publish(HEALTH, health.to_string());

    let mut consumer = consumer(&source, &sink, fast_config());
    run_until(&mut consumer, || {
        source.committed(TELEMETRY, 0) == Some(0)
            && source.committed(ALERTS, 0) == Some(0)
            && source.committed(HEALTH, 0) == Some(0)
    })
    .await
    .unwrap();

    let stored = sink.device("SVC123").unwrap();
    assert_eq!(stored.display_name.as_deref(), Some("web-01"));
    assert_eq!(stored.model.as_deref(), Some("PowerEdge R750"));
    assert_eq!(stored.last_seen_ms, 1_769_971_020_000);
    assert_eq!(consumer.registry().len(), 1);
    assert_eq!(consumer.registry().get("SVC123"), Some(&stored));

    let counts = sink.counts();
    assert_eq!((counts.metrics, counts.alerts, counts.health), (1, 1, 1));
    assert_eq!(sink.health()[0].status, HealthStatus::Critical);
}

/// 按 PostgreSQL 的约束拒绝整批：时间超出 `timestamptz` 范围或文本含 NUL。
struct StrictSink {
    inner: Arc<InMemorySink>,
}

impl StrictSink {
    fn check(batch: &SinkBatch) -> Result<(), StorageError> {
        let times = batch
            .metrics
            .iter()
            .map(|p| p.ts_ms)
            .chain(batch.alerts.iter().map(|a| a.ts_ms))
            .chain(batch.health.iter().map(|h| h.ts_ms))
            .chain(batch.devices.iter().map(|d| d.last_seen_ms));
        for ts_ms in times {
            if !(MIN_TS_MS..=MAX_TS_MS).contains(&ts_ms) {
                return Err(StorageError::Schema(format!("timestamp out of range: {ts_ms}")));
            }
        }
        let texts = batch
            .metrics
            .iter()
            .flat_map(|p| [p.device_id.clone(), p.metric_name.clone(), p.source_component.clone()])
            .chain(batch.alerts.iter().filter_map(|a| a.details.clone()))
            .chain(batch.alerts.iter().filter_map(|a| a.message.clone()))
            .chain(batch.health.iter().map(|h| h.component.clone()));
        for text in texts {
            if text.contains('\0') || text.contains("\\u0000") {
                return Err(StorageError::Schema("invalid byte sequence 0x00".to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageSink for StrictSink {
    async fn upsert_devices(&self, devices: &[DeviceRef]) -> Result<usize, StorageError> {
        self.inner.upsert_devices(devices).await
    }

    async fn insert_metric_points(&self, points: &[MetricPoint]) -> Result<usize, StorageError> {
        self.inner.insert_metric_points(points).await
    }

    async fn insert_alerts(&self, alerts: &[AlertRecord]) -> Result<usize, StorageError> {
        self.inner.insert_alerts(alerts).await
    }

    async fn insert_health(&self, records: &[HealthRecord]) -> Result<usize, StorageError> {
        self.inner.insert_health(records).await
    }

    async fn write_batch(&self, batch: &SinkBatch) -> Result<(), StorageError> {
        Self::check(batch)?;
        self.inner.write_batch(batch).await
    }
}

#[tokio::test]
async fn unwritable_values_do_not_fail_the_batch() {
    let source = MemorySource::new();
    let inner = Arc::new(InMemorySink::new());
    let sink: Arc<dyn StorageSink> = Arc::new(StrictSink {
        inner: inner.clone(),
    });
    let far_future = json!({
        "device_id": "SVC0",
        "components": [{"name": "CPU1", "metrics": [{"name": "temp", "value": 1, "ts": 99_999_999_999_999_999i64}]}]
    });
    source.publish(TELEMETRY, far_future.to_string());
    let nul_alert = json!({
        "AlertIdentifier": "A\u{0}1",
        "DeviceId": "SVC0\u{0}",
        "Severity": 16,
        "Message": "fan\u{0} failure",
        "TimeStamp": "20260201T183500Z"
    });
    source.publish(ALERTS, nul_alert.to_string());
    for index in 0..100 {
        source.publish(TELEMETRY, temperature(&format!("SVC{}", index + 1), index));
    }

    let mut consumer = ConsumerLoop::new(Box::new(source.clone()), sink, router(), fast_config());
    let report = run_until(&mut consumer, || source.committed(TELEMETRY, 0) == Some(100))
        .await
        .unwrap();

    assert_eq!(report.batches_failed, 0);
    assert_eq!(source.committed(ALERTS, 0), Some(0));
    assert_eq!(inner.counts().metrics, 101);
    assert_eq!(inner.counts().alerts, 1);
    let alerts = inner.alerts();
    assert_eq!(alerts[0].device_id, "SVC0");
    assert_eq!(alerts[0].message.as_deref(), Some("fan failure"));
}

#[tokio::test]
async fn revoked_partition_offsets_are_not_committed() {
    let source = MemorySource::new();
    let sink = Arc::new(InMemorySink::new());
    for index in 0..5 {
        source.publish(TELEMETRY, temperature("SVC1", index));
    }

    let config = PipelineConfig {
        batch_max_records: 1_000,
        batch_max_interval: Duration::from_secs(60),
        ..fast_config()
    };
    let mut consumer = consumer(&source, &sink, config);
    let cancel = CancellationToken::new();
    let rebalance = {
        let source = source.clone();
        let cancel = cancel.clone();
        async move {
            let deadline = Instant::now() + Duration::from_secs(5);
            while source.pending() > 0 && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            // 分区转给其他成员，对方已提交到更靠后的位置。
            source.revoke(TELEMETRY, 0);
            source.commit_external(TELEMETRY, 0, 9);
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        }
    };
    let (result, ()) = tokio::join!(consumer.run(cancel.clone()), rebalance);
    result.unwrap();

    assert_eq!(source.committed(TELEMETRY, 0), Some(9));
    assert_eq!(sink.counts().metrics, 5);
}
