//! # OME 事件规范化
//!
//! 将 broker 原始报文转换为统一的时序记录：
//!
//! - [`router`]：按 topic（必要时按报文内类型字段）选择规范化器
//! - [`telemetry`]：遥测报文深度优先扁平化为 `MetricPoint`
//! - [`alert`]：告警报文映射严重级别并生成确定性去重指纹
//! - [`health`]：健康报文按组件生成 `HealthRecord`
//! - [`envelope`]：各类报文信封的显式 schema（必填 / 可选字段与兜底）
//! - [`vocabulary`]：单位、严重级别、健康状态的固定词表
//! - [`timestamp`]：OME 紧凑格式 / RFC 3339 / epoch 时间解析
//! - [`scrub`]：移除存储层不接受的 NUL 字符
//!
//! 规范化器是纯函数：不做 I/O，不记录日志。值层面的异常通过兜底档位吸收，
//! 只有无法路由的报文（解码失败、未知 topic、缺失类型字段）才返回错误。
//! 输出总是可写入的：文本不含 NUL，时间落在 `timestamptz` 范围内。

pub mod alert;
pub mod envelope;
pub mod health;
pub mod router;
pub mod scrub;
pub mod telemetry;
pub mod timestamp;
pub mod vocabulary;

pub use alert::normalize_alerts;
pub use health::normalize_health;
pub use router::{Routed, Router};
pub use telemetry::normalize_telemetry;

use domain::{AlertRecord, DeviceFragment, EventKind, HealthRecord, MetricPoint};

/// 规范化错误（仅路由层面，值层面的异常不会报错）。
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("missing event type discriminator")]
    MissingDiscriminator,
    #[error("unknown event type: {0}")]
    UnknownDiscriminator(String),
}

/// 单条消息的规范化输出。
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub kind: EventKind,
    pub devices: Vec<DeviceFragment>,
    pub metrics: Vec<MetricPoint>,
    pub alerts: Vec<AlertRecord>,
    pub health: Vec<HealthRecord>,
}

impl Normalized {
    pub fn empty(kind: EventKind) -> Self {
        Self {
            kind,
            devices: Vec::new(),
            metrics: Vec::new(),
            alerts: Vec::new(),
            health: Vec::new(),
        }
    }

    pub fn extend(&mut self, other: Normalized) {
        self.devices.extend(other.devices);
        self.metrics.extend(other.metrics);
        self.alerts.extend(other.alerts);
        self.health.extend(other.health);
    }

    /// 记录总数（不含设备片段）。
    pub fn record_count(&self) -> usize {
        self.metrics.len() + self.alerts.len() + self.health.len()
    }
}

/// 缺失设备标识时使用的占位 ID。
pub const UNKNOWN_DEVICE: &str = "unknown";
