//! 告警规范化
//!
//! `{ "Data": [...] }` 容器按 1:N 展开。严重级别无法识别时落入 Unknown，
//! 告警不会因为陌生标签而丢失。
//!
//! 去重指纹（alert_id）是确定性的 UUIDv5：
//! - 有源告警 ID：`alert:{device}:{source_id}:{ts_ms}`
//! - 无源告警 ID：`alert:{device}:{规范化 JSON}`（键排序后序列化）

use crate::envelope::{AlertEvent, data_container};
use crate::scrub::without_nul;
use crate::timestamp::{clamp_ts, parse_timestamp};
use crate::vocabulary::severity_from;
use crate::{NormalizeError, Normalized, UNKNOWN_DEVICE};
use domain::{AlertRecord, DeviceFragment, EventKind};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

static SERVICE_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"System Service Tag:\s*([A-Za-z0-9_-]+)").ok());
static DISPLAY_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Device Display Name:\s*([^,]+)").ok());
static RAC_FQDN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"RAC FQDN:\s*([^,\n]+)").ok());
static MESSAGE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Message ID:\s*([^,\n]+)").ok());

/// 从描述文本中提取的设备信息。
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DescriptionFields {
    pub service_tag: Option<String>,
    pub display_name: Option<String>,
    pub rac_fqdn: Option<String>,
    pub message_id: Option<String>,
}

pub fn parse_description(description: &str) -> DescriptionFields {
    DescriptionFields {
        service_tag: capture(&SERVICE_TAG, description),
        display_name: capture(&DISPLAY_NAME, description),
        rac_fqdn: capture(&RAC_FQDN, description),
        message_id: capture(&MESSAGE_ID, description),
    }
}

fn capture(pattern: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    let regex = pattern.as_ref()?;
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|found| found.as_str().trim().to_string())
        .filter(|found| !found.is_empty())
}

/// 规范化一条告警报文（单条、数组或 `Data` 容器）。
pub fn normalize_alerts(body: &Value, fallback_ts_ms: i64) -> Result<Normalized, NormalizeError> {
    let body = without_nul(body);
    let body: &Value = &body;
    let fallback_ts_ms = clamp_ts(fallback_ts_ms);
    let items: Vec<&Value> = match (body, data_container(body)) {
        (_, Some(items)) => items.iter().collect(),
        (Value::Array(items), None) => items.iter().collect(),
        (Value::Object(_), None) => vec![body],
        _ => return Err(NormalizeError::Decode("alert envelope is not an object".to_string())),
    };

    let mut output = Normalized::empty(EventKind::Alert);
    let mut first_error = None;
    for item in &items {
        match normalize_one(item, fallback_ts_ms) {
            Ok((record, fragment)) => {
                output.alerts.push(record);
                output.devices.push(fragment);
            }
            Err(err) if first_error.is_none() => first_error = Some(err),
            Err(_) => {}
        }
    }
    match first_error {
        Some(err) if output.alerts.is_empty() => Err(err),
        _ => Ok(output),
    }
}

fn normalize_one(
    item: &Value,
    fallback_ts_ms: i64,
) -> Result<(AlertRecord, DeviceFragment), NormalizeError> {
    if !item.is_object() {
        return Err(NormalizeError::Decode("alert entry is not an object".to_string()));
    }
    let event =
        AlertEvent::deserialize(item).map_err(|err| NormalizeError::Decode(err.to_string()))?;

    let message = event.description.clone().or(event.message.clone());
    let parsed = message
        .as_deref()
        .map(parse_description)
        .unwrap_or_default();

    let device_id = event
        .device_id
        .clone()
        .or(event.service_tag.clone())
        .or(parsed.service_tag)
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());
    let display_name = event
        .device_name
        .clone()
        .or(parsed.display_name)
        .or(parsed.rac_fqdn);
    let ts_ms = event
        .timestamp
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or(fallback_ts_ms);
    let alert_id = fingerprint(&device_id, event.alert_id.as_deref(), ts_ms, item);

    let record = AlertRecord {
        device_id: device_id.clone(),
        alert_id,
        source_alert_id: event.alert_id,
        ts_ms,
        severity: severity_from(event.severity.as_ref()),
        category: event.category.or(event.message_id).or(parsed.message_id),
        message,
        acknowledged: event.acknowledged,
        details: Some(canonical_json(item)),
    };
    let fragment = DeviceFragment {
        device_id,
        display_name,
        model: None,
        seen_at_ms: ts_ms,
    };
    Ok((record, fragment))
}

/// 确定性告警指纹。
pub fn fingerprint(device_id: &str, source_alert_id: Option<&str>, ts_ms: i64, raw: &Value) -> String {
    let name = match source_alert_id {
        Some(source_id) => format!("alert:{device_id}:{source_id}:{ts_ms}"),
        None => format!("alert:{device_id}:{}", canonical_json(raw)),
    };
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// 键排序后的紧凑 JSON。
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, inner) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(inner, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
