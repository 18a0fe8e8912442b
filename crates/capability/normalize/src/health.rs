//! 健康规范化：每个上报组件一条 `HealthRecord`。
//!
//! 平铺报文（只有设备级状态）记为组件 `system`；
//! 带组件列表且同时有设备级状态时，两者都会输出。

use crate::envelope::{HealthEvent, data_container};
use crate::scrub::without_nul;
use crate::timestamp::{clamp_ts, parse_timestamp};
use crate::vocabulary::health_status_from;
use crate::{NormalizeError, Normalized, UNKNOWN_DEVICE};
use domain::{DeviceFragment, EventKind, HealthRecord};
use serde::Deserialize;
use serde_json::Value;

/// 设备级状态使用的组件名。
pub const SYSTEM_COMPONENT: &str = "system";

pub fn normalize_health(body: &Value, fallback_ts_ms: i64) -> Result<Normalized, NormalizeError> {
    let body = without_nul(body);
    let body: &Value = &body;
    let fallback_ts_ms = clamp_ts(fallback_ts_ms);
    let items: Vec<&Value> = match (body, data_container(body)) {
        (_, Some(items)) => items.iter().collect(),
        (Value::Array(items), None) => items.iter().collect(),
        (Value::Object(_), None) => vec![body],
        _ => return Err(NormalizeError::Decode("health envelope is not an object".to_string())),
    };

    let mut output = Normalized::empty(EventKind::Health);
    let mut first_error = None;
    let mut succeeded = 0usize;
    for item in items {
        match normalize_one(item, fallback_ts_ms) {
            Ok(normalized) => {
                succeeded += 1;
                output.extend(normalized);
            }
            Err(err) if first_error.is_none() => first_error = Some(err),
            Err(_) => {}
        }
    }
    match first_error {
        Some(err) if succeeded == 0 => Err(err),
        _ => Ok(output),
    }
}

fn normalize_one(item: &Value, fallback_ts_ms: i64) -> Result<Normalized, NormalizeError> {
    if !item.is_object() {
        return Err(NormalizeError::Decode("health entry is not an object".to_string()));
    }
    let event =
        HealthEvent::deserialize(item).map_err(|err| NormalizeError::Decode(err.to_string()))?;
    let device_id = event
        .device_id
        .clone()
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());
    let ts_ms = event
        .timestamp
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or(fallback_ts_ms);

    let mut output = Normalized::empty(EventKind::Health);
    if event.components.is_empty() || event.status.is_some() {
        output.health.push(HealthRecord {
            device_id: device_id.clone(),
            component: SYSTEM_COMPONENT.to_string(),
            ts_ms,
            status: health_status_from(event.status.as_ref()),
        });
    }
    for (index, component) in event.components.iter().enumerate() {
        let name = component
            .name
            .clone()
            .unwrap_or_else(|| format!("component_{index}"));
        output.health.push(HealthRecord {
            device_id: device_id.clone(),
            component: name,
            ts_ms: component
                .ts
                .as_ref()
                .and_then(parse_timestamp)
                .unwrap_or(ts_ms),
            status: health_status_from(component.status.as_ref()),
        });
    }

    let seen_at_ms = output
        .health
        .iter()
        .map(|record| record.ts_ms)
        .max()
        .unwrap_or(ts_ms);
    output.devices.push(DeviceFragment {
        device_id,
        display_name: event.device_name,
        model: None,
        seen_at_ms,
    });
    Ok(output)
}
