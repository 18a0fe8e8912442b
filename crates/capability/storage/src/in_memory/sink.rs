//! 内存写入端
//!
//! 写入先在副本上暂存，全部成功后才替换可见数据，模拟事务提交。
//! 提供故障注入：整次调用失败、写入若干条后中途失败、写入延迟。

use crate::error::StorageError;
use crate::models::{SinkBatch, SinkCounts};
use crate::traits::StorageSink;
use async_trait::async_trait;
use domain::{AlertRecord, DeviceRef, HealthRecord, MetricPoint};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

type MetricKey = (String, String, String, i64);
type AlertKey = (String, String, i64);
type HealthKey = (String, String, i64);

#[derive(Debug, Clone, Default)]
struct SinkData {
    devices: BTreeMap<String, DeviceRef>,
    metrics: BTreeMap<MetricKey, MetricPoint>,
    alerts: BTreeMap<AlertKey, AlertRecord>,
    health: BTreeMap<HealthKey, HealthRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_calls: usize,
    fail_after_records: Option<usize>,
    delay: Option<Duration>,
}

/// 写入预算：中途失败注入时限制可暂存的记录数。
struct Budget(Option<usize>);

impl Budget {
    fn take(&mut self) -> Result<(), StorageError> {
        match &mut self.0 {
            Some(0) => Err(StorageError::Injected("write aborted midway".to_string())),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemorySink {
    data: Mutex<SinkData>,
    faults: Mutex<Faults>,
    calls: Mutex<usize>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来 `count` 次写入调用直接失败。
    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_calls = count;
        }
    }

    /// 下一次写入在暂存 `records` 条记录后失败（一次性）。
    pub fn fail_after_records(&self, records: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_after_records = Some(records);
        }
    }

    /// 每次写入前等待 `delay`（用于验证单次写入超时）。
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.delay = delay;
        }
    }

    /// 写入调用次数（含失败）。
    pub fn write_calls(&self) -> usize {
        self.calls.lock().map(|calls| *calls).unwrap_or(0)
    }

    pub fn counts(&self) -> SinkCounts {
        self.data
            .lock()
            .map(|data| SinkCounts {
                devices: data.devices.len(),
                metrics: data.metrics.len(),
                alerts: data.alerts.len(),
                health: data.health.len(),
            })
            .unwrap_or_default()
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceRef> {
        self.data
            .lock()
            .ok()
            .and_then(|data| data.devices.get(device_id).cloned())
    }

    pub fn metric_points(&self) -> Vec<MetricPoint> {
        self.data
            .lock()
            .map(|data| data.metrics.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.data
            .lock()
            .map(|data| data.alerts.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn health(&self) -> Vec<HealthRecord> {
        self.data
            .lock()
            .map(|data| data.health.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 执行一次事务式写入：在副本上暂存，成功后整体替换。
    async fn transact<F>(&self, stage: F) -> Result<usize, StorageError>
    where
        F: FnOnce(&mut SinkData, &mut Budget) -> Result<usize, StorageError> + Send,
    {
        let (delay, budget) = {
            let mut calls = self.calls.lock().map_err(|_| StorageError::Lock)?;
            *calls += 1;
            let mut faults = self.faults.lock().map_err(|_| StorageError::Lock)?;
            if faults.fail_calls > 0 {
                faults.fail_calls -= 1;
                return Err(StorageError::Injected("write rejected".to_string()));
            }
            (faults.delay, Budget(faults.fail_after_records.take()))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut data = self.data.lock().map_err(|_| StorageError::Lock)?;
        let mut staged = data.clone();
        let mut budget = budget;
        let written = stage(&mut staged, &mut budget)?;
        *data = staged;
        Ok(written)
    }
}

fn stage_devices(
    data: &mut SinkData,
    budget: &mut Budget,
    devices: &[DeviceRef],
) -> Result<usize, StorageError> {
    for device in devices {
        budget.take()?;
        data.devices
            .entry(device.device_id.clone())
            .and_modify(|existing| existing.merge_ref(device))
            .or_insert_with(|| device.clone());
    }
    Ok(devices.len())
}

fn stage_metrics(
    data: &mut SinkData,
    budget: &mut Budget,
    points: &[MetricPoint],
) -> Result<usize, StorageError> {
    let mut inserted = 0;
    for point in points {
        budget.take()?;
        if let std::collections::btree_map::Entry::Vacant(slot) =
            data.metrics.entry(point.natural_key())
        {
            slot.insert(point.clone());
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn stage_alerts(
    data: &mut SinkData,
    budget: &mut Budget,
    alerts: &[AlertRecord],
) -> Result<usize, StorageError> {
    let mut inserted = 0;
    for alert in alerts {
        budget.take()?;
        let key = (alert.device_id.clone(), alert.alert_id.clone(), alert.ts_ms);
        match data.alerts.get_mut(&key) {
            // 确认状态只会从未确认变为已确认。
            Some(existing) => existing.acknowledged |= alert.acknowledged,
            None => {
                data.alerts.insert(key, alert.clone());
                inserted += 1;
            }
        }
    }
    Ok(inserted)
}

fn stage_health(
    data: &mut SinkData,
    budget: &mut Budget,
    records: &[HealthRecord],
) -> Result<usize, StorageError> {
    let mut inserted = 0;
    for record in records {
        budget.take()?;
        let key = (record.device_id.clone(), record.component.clone(), record.ts_ms);
        if let std::collections::btree_map::Entry::Vacant(slot) = data.health.entry(key) {
            slot.insert(record.clone());
            inserted += 1;
        }
    }
    Ok(inserted)
}

#[async_trait]
impl StorageSink for InMemorySink {
    async fn upsert_devices(&self, devices: &[DeviceRef]) -> Result<usize, StorageError> {
        self.transact(|data, budget| stage_devices(data, budget, devices))
            .await
    }

    async fn insert_metric_points(&self, points: &[MetricPoint]) -> Result<usize, StorageError> {
        self.transact(|data, budget| stage_metrics(data, budget, points))
            .await
    }

    async fn insert_alerts(&self, alerts: &[AlertRecord]) -> Result<usize, StorageError> {
        self.transact(|data, budget| stage_alerts(data, budget, alerts))
            .await
    }

    async fn insert_health(&self, records: &[HealthRecord]) -> Result<usize, StorageError> {
        self.transact(|data, budget| stage_health(data, budget, records))
            .await
    }

    /// 四类记录在同一次暂存中完成，与 Postgres 的单事务语义一致。
    async fn write_batch(&self, batch: &SinkBatch) -> Result<(), StorageError> {
        self.transact(|data, budget| {
            let mut written = stage_devices(data, budget, &batch.devices)?;
            written += stage_metrics(data, budget, &batch.metrics)?;
            written += stage_alerts(data, budget, &batch.alerts)?;
            written += stage_health(data, budget, &batch.health)?;
            Ok(written)
        })
        .await
        .map(|_| ())
    }
}
