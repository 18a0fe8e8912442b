//! 报文信封 schema
//!
//! 每类报文用显式结构描述必填 / 可选字段：
//! - 可选字段缺失时取默认值（空列表 / `None`），由规范化器套用兜底规则；
//! - 大小写变体通过 serde alias 接受，同一报文里不会同时出现的写法才合并为别名；
//! - 未知字段一律忽略。

use serde::Deserialize;
use serde_json::Value;

/// 宽松的字段解码：接受 vendor 常见的类型漂移。
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// 字符串 / 数字 / 布尔一律转为字符串；null 与空串视为缺失。
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(value_to_string))
    }

    /// 单值或数组统一为列表，null 为空列表。
    pub fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
        })
    }

    /// 列表字段：null 视为空列表。
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// 布尔字段：接受 `true` / `1` / `"true"` / `"yes"`。
    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Bool(flag)) => flag,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(raw)) => matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "1"
            ),
            _ => false,
        })
    }

    pub fn value_to_string(value: &Value) -> Option<String> {
        let text = match value {
            Value::String(raw) => raw.trim().to_string(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }
}

/// OME 指标报告：`{ "Identifier", "Metric": [...] }`。
#[derive(Debug, Clone, Deserialize)]
pub struct MetricReport {
    #[serde(
        rename = "Identifier",
        alias = "identifier",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub identifier: Option<String>,
    #[serde(
        rename = "DeviceName",
        alias = "device_name",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub device_name: Option<String>,
    #[serde(
        rename = "Model",
        alias = "model",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub model: Option<String>,
    #[serde(rename = "Timestamp", alias = "timestamp", default)]
    pub timestamp: Option<Value>,
    #[serde(
        rename = "Metric",
        alias = "metric",
        alias = "Metrics",
        default,
        deserialize_with = "lenient::list"
    )]
    pub metrics: Vec<ReportMetric>,
}

/// 指标报告中的一个序列，时间与取值按位置配对。
#[derive(Debug, Clone, Deserialize)]
pub struct ReportMetric {
    #[serde(
        rename = "MetricId",
        alias = "metric_id",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub metric_id: Option<String>,
    #[serde(
        rename = "ComponentId",
        alias = "component_id",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub component_id: Option<String>,
    #[serde(
        rename = "TimeStamp",
        alias = "Timestamp",
        alias = "timestamp",
        default,
        deserialize_with = "lenient::one_or_many"
    )]
    pub timestamps: Vec<Value>,
    #[serde(
        rename = "MetricValue",
        alias = "Value",
        alias = "value",
        default,
        deserialize_with = "lenient::one_or_many"
    )]
    pub values: Vec<Value>,
    #[serde(
        rename = "Unit",
        alias = "unit",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub unit: Option<String>,
}

/// 组件树：`{ "device_id", "components": [...] }`。
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentTree {
    #[serde(
        alias = "DeviceId",
        alias = "deviceId",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub device_id: Option<String>,
    #[serde(
        alias = "DeviceName",
        alias = "display_name",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub device_name: Option<String>,
    #[serde(alias = "Model", default, deserialize_with = "lenient::opt_string")]
    pub model: Option<String>,
    #[serde(alias = "timestamp", alias = "Timestamp", default)]
    pub ts: Option<Value>,
    #[serde(alias = "Components", default, deserialize_with = "lenient::list")]
    pub components: Vec<Component>,
    /// 直接挂在设备上的指标（source_component 为空）。
    #[serde(alias = "Metrics", default, deserialize_with = "lenient::list")]
    pub metrics: Vec<TreeMetric>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    #[serde(
        alias = "Name",
        alias = "component",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub name: Option<String>,
    #[serde(alias = "timestamp", alias = "Timestamp", default)]
    pub ts: Option<Value>,
    #[serde(alias = "Metrics", default, deserialize_with = "lenient::list")]
    pub metrics: Vec<TreeMetric>,
    #[serde(alias = "Components", default, deserialize_with = "lenient::list")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeMetric {
    #[serde(alias = "Name", default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(alias = "Value", alias = "reading", default)]
    pub value: Option<Value>,
    #[serde(alias = "Unit", default, deserialize_with = "lenient::opt_string")]
    pub unit: Option<String>,
    #[serde(alias = "timestamp", alias = "Timestamp", default)]
    pub ts: Option<Value>,
}

/// 单条告警。
#[derive(Debug, Clone, Deserialize)]
pub struct AlertEvent {
    #[serde(
        rename = "AlertIdentifier",
        alias = "alert_id",
        alias = "AlertId",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub alert_id: Option<String>,
    #[serde(rename = "Severity", alias = "severity", default)]
    pub severity: Option<Value>,
    #[serde(
        rename = "Description",
        alias = "description",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub description: Option<String>,
    #[serde(
        rename = "Message",
        alias = "message",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub message: Option<String>,
    #[serde(
        rename = "Category",
        alias = "category",
        alias = "CategoryName",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub category: Option<String>,
    #[serde(
        rename = "EEMIMessageId",
        alias = "MessageId",
        alias = "message_id",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub message_id: Option<String>,
    #[serde(
        rename = "DeviceId",
        alias = "device_id",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub device_id: Option<String>,
    #[serde(
        rename = "SystemServiceTag",
        alias = "service_tag",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub service_tag: Option<String>,
    #[serde(
        rename = "DeviceName",
        alias = "device_name",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub device_name: Option<String>,
    #[serde(
        rename = "TimeStamp",
        alias = "Timestamp",
        alias = "timestamp",
        alias = "time",
        default
    )]
    pub timestamp: Option<Value>,
    #[serde(
        rename = "Acknowledged",
        alias = "acknowledged",
        default,
        deserialize_with = "lenient::flag"
    )]
    pub acknowledged: bool,
}

/// 单条健康报文：平铺状态或组件列表。
#[derive(Debug, Clone, Deserialize)]
pub struct HealthEvent {
    #[serde(
        rename = "DeviceId",
        alias = "device_id",
        alias = "Id",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub device_id: Option<String>,
    #[serde(
        rename = "DeviceName",
        alias = "device_name",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub device_name: Option<String>,
    #[serde(rename = "HealthStatus", alias = "Status", alias = "status", default)]
    pub status: Option<Value>,
    #[serde(
        rename = "Timestamp",
        alias = "TimeStamp",
        alias = "timestamp",
        default
    )]
    pub timestamp: Option<Value>,
    #[serde(
        rename = "Components",
        alias = "components",
        default,
        deserialize_with = "lenient::list"
    )]
    pub components: Vec<HealthComponent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthComponent {
    #[serde(
        alias = "Component",
        alias = "Name",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub name: Option<String>,
    #[serde(alias = "HealthStatus", alias = "Status", default)]
    pub status: Option<Value>,
    #[serde(alias = "Timestamp", alias = "timestamp", default)]
    pub ts: Option<Value>,
}

/// 遥测报文的可识别形态。
#[derive(Debug, Clone)]
pub enum TelemetryEnvelope {
    /// `{ "Data": [...] }` 或顶层数组，逐个元素递归处理。
    Batch(Vec<Value>),
    MetricReport(MetricReport),
    ComponentTree(ComponentTree),
}

/// `{ "Data": [...] }` 容器中的元素列表。
pub fn data_container(body: &Value) -> Option<&Vec<Value>> {
    let object = body.as_object()?;
    object
        .get("Data")
        .or_else(|| object.get("data"))
        .and_then(Value::as_array)
}

impl TelemetryEnvelope {
    /// 按字段存在性判别形态；都不匹配时返回 `None`（视为缺少必填字段）。
    pub fn classify(body: &Value) -> Result<Option<Self>, serde_json::Error> {
        if let Value::Array(items) = body {
            return Ok(Some(Self::Batch(items.clone())));
        }
        if let Some(items) = data_container(body) {
            return Ok(Some(Self::Batch(items.clone())));
        }
        let Some(object) = body.as_object() else {
            return Ok(None);
        };
        if ["Metric", "metric", "Metrics"]
            .iter()
            .any(|key| object.get(*key).is_some_and(Value::is_array))
            && ["Identifier", "identifier"]
                .iter()
                .any(|key| object.contains_key(*key))
        {
            return MetricReport::deserialize(body).map(|report| Some(Self::MetricReport(report)));
        }
        if ["components", "Components", "metrics"]
            .iter()
            .any(|key| object.contains_key(*key))
        {
            return ComponentTree::deserialize(body).map(|tree| Some(Self::ComponentTree(tree)));
        }
        Ok(None)
    }
}
