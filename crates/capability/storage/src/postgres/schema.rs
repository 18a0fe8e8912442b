//! 建表与 hypertable 初始化
//!
//! 语句全部使用 `if not exists`，可重复执行。唯一约束都包含 `ts`，
//! 满足 TimescaleDB 对分区键的要求。

use crate::error::StorageError;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

const TABLES: &[&str] = &[
    "create table if not exists devices ( \
        device_id text primary key, \
        display_name text, \
        model text, \
        first_seen timestamptz not null, \
        last_seen timestamptz not null \
     )",
    "create table if not exists metric_points ( \
        ts timestamptz not null, \
        device_id text not null, \
        metric_name text not null, \
        source_component text not null default '', \
        value_num double precision, \
        value_text text, \
        unit text, \
        tags jsonb not null default '{}'::jsonb, \
        unique (device_id, metric_name, source_component, ts) \
     )",
    "create table if not exists alerts ( \
        ts timestamptz not null, \
        device_id text not null, \
        alert_id text not null, \
        source_alert_id text, \
        severity text not null, \
        severity_rank integer not null, \
        category text, \
        message text, \
        acknowledged boolean not null default false, \
        details jsonb, \
        unique (device_id, alert_id, ts) \
     )",
    "create table if not exists health ( \
        ts timestamptz not null, \
        device_id text not null, \
        component text not null, \
        status text not null, \
        health_value integer not null, \
        unique (device_id, component, ts) \
     )",
];

const INDEXES: &[&str] = &[
    "create index if not exists idx_metric_points_device_ts on metric_points (device_id, ts desc)",
    "create index if not exists idx_metric_points_metric_ts on metric_points (metric_name, ts desc)",
    "create index if not exists idx_metric_points_component_ts on metric_points (source_component, ts desc) \
     where source_component <> ''",
    "create index if not exists idx_alerts_device_ts on alerts (device_id, ts desc)",
    "create index if not exists idx_health_device_ts on health (device_id, ts desc)",
];

/// 转为 hypertable 的时序表。
pub const TIME_SERIES_TABLES: &[&str] = &["metric_points", "alerts", "health"];

/// 初始化表结构，返回是否启用了 hypertable。
///
/// `require_timescale` 为 true 时，扩展不可用直接失败；否则退化为普通表。
pub async fn ensure_schema(pool: &PgPool, require_timescale: bool) -> Result<bool, StorageError> {
    let timescale = enable_timescale(pool, require_timescale).await?;

    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    if timescale {
        for table in TIME_SERIES_TABLES {
            sqlx::query("select create_hypertable($1::regclass, 'ts', if_not_exists => true, migrate_data => true)")
                .bind(*table)
                .execute(pool)
                .await?;
        }
    }
    for statement in INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(target: "ome.storage", timescale, "schema_ready");
    Ok(timescale)
}

async fn enable_timescale(pool: &PgPool, require_timescale: bool) -> Result<bool, StorageError> {
    let row = sqlx::query(
        "select exists(select 1 from pg_available_extensions where name = 'timescaledb') as available",
    )
    .fetch_one(pool)
    .await?;
    let available: bool = row.try_get("available")?;
    if !available {
        if require_timescale {
            return Err(StorageError::Schema(
                "timescaledb extension is not available".to_string(),
            ));
        }
        warn!(target: "ome.storage", "timescaledb_unavailable");
        return Ok(false);
    }

    match sqlx::query("create extension if not exists timescaledb")
        .execute(pool)
        .await
    {
        Ok(_) => Ok(true),
        Err(err) if !require_timescale => {
            warn!(target: "ome.storage", error = %err, "timescaledb_enable_failed");
            Ok(false)
        }
        Err(err) => Err(StorageError::Schema(format!(
            "failed to enable timescaledb: {err}"
        ))),
    }
}
