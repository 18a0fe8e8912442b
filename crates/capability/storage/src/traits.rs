//! 存储接口 Trait 定义
//!
//! `StorageSink` 是与数据来源无关的持久化窄腰：只认识通用的设备、时序点、
//! 告警与健康记录，不感知 topic、厂商或报文结构。
//!
//! 设计原则：
//! - 每个方法按自然键幂等写入（重复投递不产生重复行）
//! - 每次调用在单个事务内完成，整批成功或整批回滚
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::SinkBatch;
use async_trait::async_trait;
use domain::{AlertRecord, DeviceRef, HealthRecord, MetricPoint};

#[async_trait]
pub trait StorageSink: Send + Sync {
    /// 设备 upsert：非空字段覆盖，last_seen 取较大者。返回处理的设备数。
    async fn upsert_devices(&self, devices: &[DeviceRef]) -> Result<usize, StorageError>;

    /// 时序点写入，按 (device_id, metric_name, source_component, ts) 去重。返回新增行数。
    async fn insert_metric_points(&self, points: &[MetricPoint]) -> Result<usize, StorageError>;

    /// 告警写入，按 (device_id, alert_id, ts) 去重。返回新增行数。
    async fn insert_alerts(&self, alerts: &[AlertRecord]) -> Result<usize, StorageError>;

    /// 健康快照写入，按 (device_id, component, ts) 去重。返回新增行数。
    async fn insert_health(&self, records: &[HealthRecord]) -> Result<usize, StorageError>;

    /// 整批写入。
    ///
    /// 默认实现按记录类别依次调用（每类各自一个事务）；
    /// 支持跨表事务的实现应覆盖为单事务。
    async fn write_batch(&self, batch: &SinkBatch) -> Result<(), StorageError> {
        self.upsert_devices(&batch.devices).await?;
        self.insert_metric_points(&batch.metrics).await?;
        self.insert_alerts(&batch.alerts).await?;
        self.insert_health(&batch.health).await?;
        Ok(())
    }
}
