//! Postgres 写入端
//!
//! 每次调用一个事务；`write_batch` 把四类记录放进同一个事务。
//! 幂等依赖表上的自然键唯一约束：
//! - 时序点 / 健康：`on conflict do nothing`
//! - 告警：已存在时只合并确认状态
//! - 设备：非空字段覆盖，first_seen 取较小、last_seen 取较大

use crate::error::StorageError;
use crate::models::{SinkBatch, split_value, tags_json};
use crate::traits::StorageSink;
use async_trait::async_trait;
use domain::{AlertRecord, DeviceRef, HealthRecord, MetricPoint};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use tracing::debug;

pub struct PgSink {
    pub pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url, max_connections).await?;
        Ok(Self { pool })
    }

    /// 初始化表结构，返回是否启用了 hypertable。
    pub async fn ensure_schema(&self, require_timescale: bool) -> Result<bool, StorageError> {
        super::schema::ensure_schema(&self.pool, require_timescale).await
    }
}

async fn upsert_devices_tx(conn: &mut PgConnection, devices: &[DeviceRef]) -> Result<u64, sqlx::Error> {
    let mut affected = 0;
    for device in devices {
        let result = sqlx::query(
            "insert into devices (device_id, display_name, model, first_seen, last_seen) \
             values ($1, $2, $3, to_timestamp($4 / 1000.0), to_timestamp($4 / 1000.0)) \
             on conflict (device_id) do update set \
               display_name = coalesce(nullif(excluded.display_name, ''), devices.display_name), \
               model = coalesce(nullif(excluded.model, ''), devices.model), \
               first_seen = least(devices.first_seen, excluded.first_seen), \
               last_seen = greatest(devices.last_seen, excluded.last_seen)",
        )
        .bind(&device.device_id)
        .bind(&device.display_name)
        .bind(&device.model)
        .bind(device.last_seen_ms as f64)
        .execute(&mut *conn)
        .await?;
        affected += result.rows_affected();
    }
    Ok(affected)
}

async fn insert_metrics_tx(conn: &mut PgConnection, points: &[MetricPoint]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for point in points {
        let (value_num, value_text) = split_value(&point.value);
        let result = sqlx::query(
            "insert into metric_points \
               (ts, device_id, metric_name, source_component, value_num, value_text, unit, tags) \
             values (to_timestamp($1 / 1000.0), $2, $3, $4, $5, $6, $7, $8) \
             on conflict (device_id, metric_name, source_component, ts) do nothing",
        )
        .bind(point.ts_ms as f64)
        .bind(&point.device_id)
        .bind(&point.metric_name)
        .bind(&point.source_component)
        .bind(value_num)
        .bind(value_text)
        .bind(&point.unit)
        .bind(tags_json(&point.tags))
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

async fn insert_alerts_tx(conn: &mut PgConnection, alerts: &[AlertRecord]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for alert in alerts {
        let details = alert
            .details
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok());
        // xmax = 0 表示本次新插入，而非冲突更新。
        let row = sqlx::query(
            "insert into alerts \
               (ts, device_id, alert_id, source_alert_id, severity, severity_rank, \
                category, message, acknowledged, details) \
             values (to_timestamp($1 / 1000.0), $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             on conflict (device_id, alert_id, ts) do update set \
               acknowledged = alerts.acknowledged or excluded.acknowledged \
             returning (xmax = 0) as inserted",
        )
        .bind(alert.ts_ms as f64)
        .bind(&alert.device_id)
        .bind(&alert.alert_id)
        .bind(&alert.source_alert_id)
        .bind(alert.severity.as_str())
        .bind(alert.severity.code())
        .bind(&alert.category)
        .bind(&alert.message)
        .bind(alert.acknowledged)
        .bind(details)
        .fetch_one(&mut *conn)
        .await?;
        let is_new: bool = sqlx::Row::try_get(&row, "inserted")?;
        if is_new {
            inserted += 1;
        }
    }
    Ok(inserted)
}

async fn insert_health_tx(conn: &mut PgConnection, records: &[HealthRecord]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for record in records {
        let result = sqlx::query(
            "insert into health (ts, device_id, component, status, health_value) \
             values (to_timestamp($1 / 1000.0), $2, $3, $4, $5) \
             on conflict (device_id, component, ts) do nothing",
        )
        .bind(record.ts_ms as f64)
        .bind(&record.device_id)
        .bind(&record.component)
        .bind(record.status.as_str())
        .bind(record.status.health_value())
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

#[async_trait]
impl StorageSink for PgSink {
    async fn upsert_devices(&self, devices: &[DeviceRef]) -> Result<usize, StorageError> {
        if devices.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let affected = upsert_devices_tx(&mut tx, devices).await?;
        tx.commit().await?;
        Ok(affected as usize)
    }

    async fn insert_metric_points(&self, points: &[MetricPoint]) -> Result<usize, StorageError> {
        if points.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let inserted = insert_metrics_tx(&mut tx, points).await?;
        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn insert_alerts(&self, alerts: &[AlertRecord]) -> Result<usize, StorageError> {
        if alerts.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let inserted = insert_alerts_tx(&mut tx, alerts).await?;
        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn insert_health(&self, records: &[HealthRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let inserted = insert_health_tx(&mut tx, records).await?;
        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn write_batch(&self, batch: &SinkBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        let devices = upsert_devices_tx(&mut tx, &batch.devices).await?;
        let metrics = insert_metrics_tx(&mut tx, &batch.metrics).await?;
        let alerts = insert_alerts_tx(&mut tx, &batch.alerts).await?;
        let health = insert_health_tx(&mut tx, &batch.health).await?;
        tx.commit().await?;
        debug!(
            target: "ome.storage",
            devices,
            metrics,
            alerts,
            health,
            submitted = batch.record_count(),
            "batch_committed"
        );
        Ok(())
    }
}
