//! 数据模型
//!
//! - `SinkBatch`：一次整批写入的四类记录
//! - 列映射辅助：指标值拆分为数值列 / 文本列，标签转为 JSON

use domain::{AlertRecord, DeviceRef, HealthRecord, MetricPoint, MetricValue};
use std::collections::BTreeMap;

/// 整批写入单元：要么全部落库，要么全部回滚。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkBatch {
    pub devices: Vec<DeviceRef>,
    pub metrics: Vec<MetricPoint>,
    pub alerts: Vec<AlertRecord>,
    pub health: Vec<HealthRecord>,
}

impl SinkBatch {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
            && self.metrics.is_empty()
            && self.alerts.is_empty()
            && self.health.is_empty()
    }

    /// 时序记录数（不含设备）。
    pub fn record_count(&self) -> usize {
        self.metrics.len() + self.alerts.len() + self.health.len()
    }
}

/// 各类记录的存量（用于测试与巡检）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCounts {
    pub devices: usize,
    pub metrics: usize,
    pub alerts: usize,
    pub health: usize,
}

impl SinkCounts {
    pub fn records(&self) -> usize {
        self.metrics + self.alerts + self.health
    }
}

/// 指标值列映射：(value_num, value_text)。
///
/// 布尔值两列都写，便于数值聚合也保留原始表示。
pub fn split_value(value: &MetricValue) -> (Option<f64>, Option<String>) {
    (value.as_f64(), value.as_text())
}

pub fn tags_json(tags: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        tags.iter()
            .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
            .collect(),
    )
}
