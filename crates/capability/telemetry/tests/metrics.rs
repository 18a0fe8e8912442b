use ome_telemetry::{TelemetryMetrics, metrics, record_batch_flushed, record_normalized};

#[test]
fn fresh_metrics_snapshot_is_zero() {
    let local = TelemetryMetrics::new();
    assert_eq!(local.snapshot(), Default::default());
}

#[test]
fn recorders_accumulate_into_global_metrics() {
    let before = metrics().snapshot();
    record_normalized(3, 1, 2);
    record_batch_flushed(15);
    let after = metrics().snapshot();

    assert!(after.metric_points >= before.metric_points + 3);
    assert!(after.alerts >= before.alerts + 1);
    assert!(after.health_records >= before.health_records + 2);
    assert!(after.batches_flushed > before.batches_flushed);
    assert!(after.flush_latency_ms_total >= before.flush_latency_ms_total + 15);
}
