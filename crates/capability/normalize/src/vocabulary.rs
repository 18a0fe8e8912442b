//! 固定词表：单位、严重级别、健康状态
//!
//! 所有映射都不区分大小写；无法识别的单位原样保留，
//! 无法识别的严重级别 / 健康状态落入 Unknown 档位。

use domain::{HealthStatus, Severity};
use serde_json::Value;
use std::collections::BTreeMap;

const UNIT_TABLE: &[(&[&str], &str)] = &[
    (&["c", "°c", "cel", "celsius"], "celsius"),
    (&["f", "°f", "fahrenheit"], "fahrenheit"),
    (&["w", "watt", "watts"], "watts"),
    (&["kw", "kilowatt", "kilowatts"], "kilowatts"),
    (&["wh", "watt_hours"], "watt_hours"),
    (&["kwh", "kilowatt_hours"], "kilowatt_hours"),
    (&["a", "amp", "amps", "amperes"], "amperes"),
    (&["v", "volt", "volts"], "volts"),
    (&["%", "percent", "pct"], "percent"),
    (&["rpm"], "rpm"),
    (&["hz", "hertz"], "hertz"),
    (&["s", "sec", "seconds"], "seconds"),
    (&["ms", "milliseconds"], "milliseconds"),
    (&["b", "bytes"], "bytes"),
    (&["mb", "megabytes"], "megabytes"),
    (&["gb", "gigabytes"], "gigabytes"),
];

/// 单位归一化；空串返回 `None`，未知单位原样返回。
pub fn canonical_unit(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    let canonical = UNIT_TABLE
        .iter()
        .find(|(aliases, _)| aliases.contains(&lowered.as_str()))
        .map(|(_, canonical)| (*canonical).to_string());
    Some(canonical.unwrap_or_else(|| trimmed.to_string()))
}

/// 由指标类型推断单位（`PSU.AmpsReading...` → amperes）。
pub fn infer_unit(metric_type: &str) -> Option<&'static str> {
    if metric_type.contains("Amps") {
        Some("amperes")
    } else if metric_type.contains("Temperature") {
        Some("celsius")
    } else if metric_type.contains("Power") || metric_type.contains("Energy") {
        Some("watts")
    } else if metric_type.contains("Voltage") {
        Some("volts")
    } else {
        None
    }
}

/// 拆解点分 MetricId：`组件类型.指标类型.聚合方式.间隔...`。
pub fn metric_id_tags(metric_id: &str) -> BTreeMap<String, String> {
    let parts: Vec<&str> = metric_id.split('.').collect();
    let mut tags = BTreeMap::new();
    if parts.len() >= 2 {
        tags.insert("component_type".to_string(), parts[0].to_string());
        tags.insert("metric_type".to_string(), parts[1].to_string());
    }
    if parts.len() >= 3 {
        tags.insert("aggregation".to_string(), parts[2].to_string());
    }
    if parts.len() >= 4 {
        tags.insert("interval".to_string(), parts[3].to_string());
    }
    tags
}

/// 严重级别：接受 OME 数值编码或名称。
pub fn severity_from(value: Option<&Value>) -> Severity {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .map(severity_from_code)
            .unwrap_or(Severity::Unknown),
        Some(Value::String(raw)) => severity_from_str(raw),
        _ => Severity::Unknown,
    }
}

fn severity_from_code(code: i64) -> Severity {
    match code {
        2 => Severity::Info,
        4 => Severity::Normal,
        8 => Severity::Warning,
        16 => Severity::Critical,
        _ => Severity::Unknown,
    }
}

pub fn severity_from_str(raw: &str) -> Severity {
    let lowered = raw.trim().to_ascii_lowercase();
    if let Ok(code) = lowered.parse::<i64>() {
        return severity_from_code(code);
    }
    match lowered.as_str() {
        "info" | "informational" => Severity::Info,
        "normal" | "ok" | "healthy" => Severity::Normal,
        "warning" | "warn" | "minor" | "major" => Severity::Warning,
        "critical" | "error" | "fatal" => Severity::Critical,
        _ => Severity::Unknown,
    }
}

/// 健康状态：接受名称或 OME 数值（1000/2000/3000）。
pub fn health_status_from(value: Option<&Value>) -> HealthStatus {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .map(health_status_from_code)
            .unwrap_or(HealthStatus::Unknown),
        Some(Value::String(raw)) => health_status_from_str(raw),
        _ => HealthStatus::Unknown,
    }
}

fn health_status_from_code(code: i64) -> HealthStatus {
    match code {
        1000 => HealthStatus::Ok,
        2000 => HealthStatus::Warning,
        3000 => HealthStatus::Critical,
        _ => HealthStatus::Unknown,
    }
}

pub fn health_status_from_str(raw: &str) -> HealthStatus {
    let lowered = raw.trim().to_ascii_lowercase();
    if let Ok(code) = lowered.parse::<i64>() {
        return health_status_from_code(code);
    }
    match lowered.as_str() {
        "ok" | "healthy" | "normal" => HealthStatus::Ok,
        "warning" | "warn" | "degraded" => HealthStatus::Warning,
        "critical" | "error" | "failed" => HealthStatus::Critical,
        _ => HealthStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn units_are_case_insensitive_with_passthrough() {
        assert_eq!(canonical_unit("C").as_deref(), Some("celsius"));
        assert_eq!(canonical_unit("°C").as_deref(), Some("celsius"));
        assert_eq!(canonical_unit("KWh").as_deref(), Some("kilowatt_hours"));
        assert_eq!(canonical_unit(" RPM ").as_deref(), Some("rpm"));
        assert_eq!(canonical_unit("lux").as_deref(), Some("lux"));
        assert_eq!(canonical_unit("  "), None);
    }

    #[test]
    fn metric_id_is_split_into_tags() {
        let tags = metric_id_tags("PSU.AmpsReading.Average.5.Interval");
        assert_eq!(tags.get("component_type").map(String::as_str), Some("PSU"));
        assert_eq!(tags.get("metric_type").map(String::as_str), Some("AmpsReading"));
        assert_eq!(tags.get("aggregation").map(String::as_str), Some("Average"));
        assert_eq!(tags.get("interval").map(String::as_str), Some("5"));
        assert!(metric_id_tags("temp").is_empty());
        assert_eq!(infer_unit("AmpsReading"), Some("amperes"));
        assert_eq!(infer_unit("FanSpeed"), None);
    }

    #[test]
    fn severity_codes_and_names() {
        assert_eq!(severity_from(Some(&json!(16))), Severity::Critical);
        assert_eq!(severity_from(Some(&json!("8"))), Severity::Warning);
        assert_eq!(severity_from(Some(&json!("Informational"))), Severity::Info);
        assert_eq!(severity_from(Some(&json!("MAJOR"))), Severity::Warning);
        assert_eq!(severity_from(Some(&json!("catastrophic"))), Severity::Unknown);
        assert_eq!(severity_from(Some(&json!(3))), Severity::Unknown);
        assert_eq!(severity_from(None), Severity::Unknown);
        assert!(Severity::Unknown < Severity::Info);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn health_status_vocabulary() {
        assert_eq!(health_status_from(Some(&json!("Healthy"))), HealthStatus::Ok);
        assert_eq!(health_status_from(Some(&json!(2000))), HealthStatus::Warning);
        assert_eq!(health_status_from(Some(&json!("3000"))), HealthStatus::Critical);
        assert_eq!(health_status_from(Some(&json!("degraded"))), HealthStatus::Warning);
        assert_eq!(health_status_from(Some(&json!("sideways"))), HealthStatus::Unknown);
        assert_eq!(health_status_from(Some(&json!(null))), HealthStatus::Unknown);
    }
}
