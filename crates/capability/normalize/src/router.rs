//! 路由：topic → 事件类别 → 规范化器
//!
//! topic 到类别是静态映射；`mixed` topic 需要报文内的类型字段判别。
//! 未知 topic、解码失败、缺失 / 未知类型字段都返回错误，由采集循环按毒消息处理。

use crate::{NormalizeError, Normalized, normalize_alerts, normalize_health, normalize_telemetry};
use domain::{EventKind, RawMessage};
use ome_config::{TopicBinding, TopicKind};
use serde_json::Value;
use std::collections::HashMap;

const DISCRIMINATOR_KEYS: &[&str] = &["EventType", "event_type", "Type", "type"];

/// 路由结果：事件类别与已解码的报文。
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub kind: EventKind,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: HashMap<String, Option<TopicKind>>,
}

impl Router {
    pub fn new(bindings: &[TopicBinding]) -> Self {
        let routes = bindings
            .iter()
            .map(|binding| (binding.topic.clone(), binding.kind))
            .collect();
        Self { routes }
    }

    /// 判定消息类别并解码报文。
    pub fn route(&self, message: &RawMessage) -> Result<Routed, NormalizeError> {
        let topic_kind = self
            .routes
            .get(&message.topic)
            .copied()
            .flatten()
            .ok_or_else(|| NormalizeError::UnknownTopic(message.topic.clone()))?;

        let body: Value = serde_json::from_slice(&message.payload)
            .map_err(|err| NormalizeError::Decode(err.to_string()))?;

        let kind = match topic_kind {
            TopicKind::Telemetry => EventKind::Telemetry,
            TopicKind::Alert => EventKind::Alert,
            TopicKind::Health => EventKind::Health,
            TopicKind::Mixed => discriminate(&body)?,
        };
        Ok(Routed { kind, body })
    }

    /// 路由并规范化；缺失时间戳时以 broker 消息时间兜底。
    pub fn normalize(&self, message: &RawMessage) -> Result<Normalized, NormalizeError> {
        let Routed { kind, body } = self.route(message)?;
        match kind {
            EventKind::Telemetry => normalize_telemetry(&body, message.timestamp_ms),
            EventKind::Alert => normalize_alerts(&body, message.timestamp_ms),
            EventKind::Health => normalize_health(&body, message.timestamp_ms),
        }
    }
}

/// 混合 topic 的二级判别：取第一个存在的类型字段。
fn discriminate(body: &Value) -> Result<EventKind, NormalizeError> {
    let tag = DISCRIMINATOR_KEYS
        .iter()
        .find_map(|key| body.get(*key))
        .ok_or(NormalizeError::MissingDiscriminator)?;
    let Some(raw) = tag.as_str() else {
        return Err(NormalizeError::UnknownDiscriminator(tag.to_string()));
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "telemetry" | "metric" | "metricreport" => Ok(EventKind::Telemetry),
        "alert" | "event" => Ok(EventKind::Alert),
        "health" | "status" => Ok(EventKind::Health),
        _ => Err(NormalizeError::UnknownDiscriminator(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discriminator_uses_first_present_key() {
        assert_eq!(
            discriminate(&json!({"EventType": "Alert", "type": "telemetry"})).unwrap(),
            EventKind::Alert
        );
        assert_eq!(
            discriminate(&json!({"type": "MetricReport"})).unwrap(),
            EventKind::Telemetry
        );
        assert!(matches!(
            discriminate(&json!({"device_id": "x"})),
            Err(NormalizeError::MissingDiscriminator)
        ));
        assert!(matches!(
            discriminate(&json!({"event_type": "inventory"})),
            Err(NormalizeError::UnknownDiscriminator(tag)) if tag == "inventory"
        ));
        assert!(matches!(
            discriminate(&json!({"Type": 3})),
            Err(NormalizeError::UnknownDiscriminator(_))
        ));
    }
}
