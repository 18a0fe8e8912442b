/// 设备登记记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub device_id: String,
    pub display_name: Option<String>,
    pub model: Option<String>,
    pub last_seen_ms: i64,
}

/// 单条事件中观察到的设备元数据片段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFragment {
    pub device_id: String,
    pub display_name: Option<String>,
    pub model: Option<String>,
    pub seen_at_ms: i64,
}

impl DeviceRef {
    /// 首次观察时由片段构造。
    pub fn from_fragment(fragment: &DeviceFragment) -> Self {
        Self {
            device_id: fragment.device_id.clone(),
            display_name: non_empty(fragment.display_name.as_deref()),
            model: non_empty(fragment.model.as_deref()),
            last_seen_ms: fragment.seen_at_ms,
        }
    }

    /// 非破坏式合并：只有新值非空时才覆盖，last_seen 取较大者。
    pub fn merge(&mut self, fragment: &DeviceFragment) {
        if let Some(name) = non_empty(fragment.display_name.as_deref()) {
            self.display_name = Some(name);
        }
        if let Some(model) = non_empty(fragment.model.as_deref()) {
            self.model = Some(model);
        }
        self.last_seen_ms = self.last_seen_ms.max(fragment.seen_at_ms);
    }

    /// 以另一条登记记录为片段合并（存储层 upsert 使用同一语义）。
    pub fn merge_ref(&mut self, other: &DeviceRef) {
        self.merge(&DeviceFragment {
            device_id: other.device_id.clone(),
            display_name: other.display_name.clone(),
            model: other.model.clone(),
            seen_at_ms: other.last_seen_ms,
        });
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
