//! 遥测规范化
//!
//! 组件树深度优先展开，每个叶子指标生成一个 `MetricPoint`：
//! - 设备标识从信封头读取一次并传播到所有点；
//! - 时间优先级：指标自身 > 所在组件（逐层继承）> 信封 > broker 消息时间；
//! - 数值字符串按数值写入，缺失 / 非数值保留为文本值。

use crate::envelope::{Component, ComponentTree, MetricReport, TelemetryEnvelope, TreeMetric};
use crate::scrub::without_nul;
use crate::timestamp::{clamp_ts, parse_timestamp};
use crate::vocabulary::{canonical_unit, infer_unit, metric_id_tags};
use crate::{NormalizeError, Normalized, UNKNOWN_DEVICE};
use domain::{DeviceFragment, EventKind, MetricPoint, MetricValue};
use serde_json::Value;
use std::collections::BTreeMap;

/// 规范化一条遥测报文。
///
/// `fallback_ts_ms` 为报文内没有任何时间字段时使用的时间（broker 消息时间）。
pub fn normalize_telemetry(body: &Value, fallback_ts_ms: i64) -> Result<Normalized, NormalizeError> {
    let body = without_nul(body);
    let fallback_ts_ms = clamp_ts(fallback_ts_ms);
    let envelope = TelemetryEnvelope::classify(&body)
        .map_err(|err| NormalizeError::Decode(err.to_string()))?
        .ok_or(NormalizeError::MissingField("components"))?;

    match envelope {
        TelemetryEnvelope::Batch(items) => normalize_batch(&items, fallback_ts_ms),
        TelemetryEnvelope::MetricReport(report) => Ok(normalize_report(&report, fallback_ts_ms)),
        TelemetryEnvelope::ComponentTree(tree) => Ok(normalize_tree(&tree, fallback_ts_ms)),
    }
}

/// 批量容器：跳过无法识别的元素，全部失败时返回第一个错误。
fn normalize_batch(items: &[Value], fallback_ts_ms: i64) -> Result<Normalized, NormalizeError> {
    let mut output = Normalized::empty(EventKind::Telemetry);
    let mut first_error = None;
    let mut succeeded = 0usize;
    for item in items {
        match normalize_telemetry(item, fallback_ts_ms) {
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

fn normalize_report(report: &MetricReport, fallback_ts_ms: i64) -> Normalized {
    let device_id = report
        .identifier
        .clone()
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());
    let envelope_ts = report
        .timestamp
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or(fallback_ts_ms);

    let mut output = Normalized::empty(EventKind::Telemetry);
    for (index, metric) in report.metrics.iter().enumerate() {
        let metric_name = metric
            .metric_id
            .clone()
            .unwrap_or_else(|| format!("metric_{index}"));
        let source_component = metric.component_id.clone().unwrap_or_default();
        let tags = metric_id_tags(&metric_name);
        let unit = resolve_unit(metric.unit.as_deref(), &tags);

        let samples: Vec<(i64, MetricValue)> = if metric.values.is_empty() {
            let ts = metric
                .timestamps
                .first()
                .and_then(parse_timestamp)
                .unwrap_or(envelope_ts);
            vec![(ts, metric_value(None))]
        } else if metric.timestamps.is_empty() {
            metric
                .values
                .iter()
                .map(|value| (envelope_ts, metric_value(Some(value))))
                .collect()
        } else {
            metric
                .timestamps
                .iter()
                .zip(&metric.values)
                .map(|(ts, value)| {
                    (
                        parse_timestamp(ts).unwrap_or(envelope_ts),
                        metric_value(Some(value)),
                    )
                })
                .collect()
        };

        for (ts_ms, value) in samples {
            output.metrics.push(MetricPoint {
                device_id: device_id.clone(),
                metric_name: metric_name.clone(),
                source_component: source_component.clone(),
                ts_ms,
                value,
                unit: unit.clone(),
                tags: tags.clone(),
            });
        }
    }

    let seen_at_ms = latest_ts(&output.metrics).unwrap_or(envelope_ts);
    output.devices.push(DeviceFragment {
        device_id,
        display_name: report.device_name.clone(),
        model: report.model.clone(),
        seen_at_ms,
    });
    output
}

fn normalize_tree(tree: &ComponentTree, fallback_ts_ms: i64) -> Normalized {
    let device_id = tree
        .device_id
        .clone()
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());
    let envelope_ts = tree
        .ts
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or(fallback_ts_ms);

    let mut output = Normalized::empty(EventKind::Telemetry);
    let mut walker = TreeWalker {
        device_id: &device_id,
        points: &mut output.metrics,
    };
    walker.emit_metrics(&tree.metrics, "", envelope_ts);
    for (index, component) in tree.components.iter().enumerate() {
        walker.walk(component, index, None, envelope_ts);
    }

    let seen_at_ms = latest_ts(&output.metrics).unwrap_or(envelope_ts);
    output.devices.push(DeviceFragment {
        device_id,
        display_name: tree.device_name.clone(),
        model: tree.model.clone(),
        seen_at_ms,
    });
    output
}

struct TreeWalker<'a> {
    device_id: &'a str,
    points: &'a mut Vec<MetricPoint>,
}

impl TreeWalker<'_> {
    /// 嵌套组件以 `父/子` 路径作为 source_component；未命名组件按同级序号命名。
    fn walk(&mut self, component: &Component, index: usize, parent: Option<&str>, inherited_ts: i64) {
        let name = component
            .name
            .clone()
            .unwrap_or_else(|| format!("component_{index}"));
        let path = match parent {
            Some(parent) => format!("{parent}/{name}"),
            None => name.to_string(),
        };
        let component_ts = component
            .ts
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(inherited_ts);

        self.emit_metrics(&component.metrics, &path, component_ts);
        for (index, child) in component.components.iter().enumerate() {
            self.walk(child, index, Some(&path), component_ts);
        }
    }

    fn emit_metrics(&mut self, metrics: &[TreeMetric], source_component: &str, inherited_ts: i64) {
        for (index, metric) in metrics.iter().enumerate() {
            let metric_name = metric
                .name
                .clone()
                .unwrap_or_else(|| format!("metric_{index}"));
            let tags = metric_id_tags(&metric_name);
            let unit = resolve_unit(metric.unit.as_deref(), &tags);
            let ts_ms = metric
                .ts
                .as_ref()
                .and_then(parse_timestamp)
                .unwrap_or(inherited_ts);
            self.points.push(MetricPoint {
                device_id: self.device_id.to_string(),
                metric_name,
                source_component: source_component.to_string(),
                ts_ms,
                value: metric_value(metric.value.as_ref()),
                unit,
                tags,
            });
        }
    }
}

/// 显式单位优先，其次按 MetricId 中的指标类型推断。
fn resolve_unit(explicit: Option<&str>, tags: &BTreeMap<String, String>) -> Option<String> {
    explicit.and_then(canonical_unit).or_else(|| {
        tags.get("metric_type")
            .and_then(|metric_type| infer_unit(metric_type))
            .map(str::to_string)
    })
}

fn metric_value(value: Option<&Value>) -> MetricValue {
    match value {
        None | Some(Value::Null) => MetricValue::Text(String::new()),
        Some(Value::Bool(flag)) => MetricValue::Bool(*flag),
        Some(Value::Number(number)) => number
            .as_f64()
            .filter(|v| v.is_finite())
            .map(MetricValue::Number)
            .unwrap_or_else(|| MetricValue::Text(number.to_string())),
        Some(Value::String(raw)) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(MetricValue::Number)
            .unwrap_or_else(|| MetricValue::Text(raw.clone())),
        Some(other) => MetricValue::Text(other.to_string()),
    }
}

fn latest_ts(points: &[MetricPoint]) -> Option<i64> {
    points.iter().map(|point| point.ts_ms).max()
}
