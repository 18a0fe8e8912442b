use std::collections::BTreeMap;

/// Broker 投递的原始消息。
///
/// `timestamp_ms` 取 broker 记录的消息时间，重复投递时保持不变，
/// 因此可以作为缺失时间戳的兜底值参与幂等键。
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
    pub timestamp_ms: i64,
}

impl RawMessage {
    pub fn position(&self) -> PartitionOffset {
        PartitionOffset {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// 分区内已处理的最高 offset（提交时由 broker 实现换算为下一个待读 offset）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// 被撤销（再均衡后不再归本实例消费）的分区。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

/// 事件类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Telemetry,
    Alert,
    Health,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Telemetry => "telemetry",
            EventKind::Alert => "alert",
            EventKind::Health => "health",
        }
    }
}

/// 指标值。
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl MetricValue {
    /// 数值视图：布尔值折算为 1/0，文本不参与数值列。
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            MetricValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            MetricValue::Number(_) => None,
            MetricValue::Bool(v) => Some(v.to_string()),
            MetricValue::Text(v) => Some(v.clone()),
        }
    }
}

/// 扁平化后的单个时序点。
///
/// 自然键：(device_id, metric_name, source_component, ts_ms)。
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub device_id: String,
    pub metric_name: String,
    pub source_component: String,
    pub ts_ms: i64,
    pub value: MetricValue,
    pub unit: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl MetricPoint {
    pub fn natural_key(&self) -> (String, String, String, i64) {
        (
            self.device_id.clone(),
            self.metric_name.clone(),
            self.source_component.clone(),
            self.ts_ms,
        )
    }
}

/// 告警严重级别（有序，Unknown 最低）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Unknown,
    Info,
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Info => "info",
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// OME 数值编码。
    pub fn code(&self) -> i32 {
        match self {
            Severity::Unknown => 1,
            Severity::Info => 2,
            Severity::Normal => 4,
            Severity::Warning => 8,
            Severity::Critical => 16,
        }
    }
}

/// 规范化告警。
///
/// 自然键：(device_id, alert_id, ts_ms)，alert_id 为确定性指纹。
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub device_id: String,
    pub alert_id: String,
    pub source_alert_id: Option<String>,
    pub ts_ms: i64,
    pub severity: Severity,
    pub category: Option<String>,
    pub message: Option<String>,
    pub acknowledged: bool,
    /// 原始告警对象（JSON 文本）。
    pub details: Option<String>,
}

/// 组件健康状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// OME 健康数值编码。
    pub fn health_value(&self) -> i32 {
        match self {
            HealthStatus::Ok => 1000,
            HealthStatus::Warning => 2000,
            HealthStatus::Critical => 3000,
            HealthStatus::Unknown => 0,
        }
    }
}

/// 健康快照（非增量）。
///
/// 自然键：(device_id, component, ts_ms)。
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    pub device_id: String,
    pub component: String,
    pub ts_ms: i64,
    pub status: HealthStatus,
}
