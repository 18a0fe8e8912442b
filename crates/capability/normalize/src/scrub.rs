//! 报文清洗
//!
//! PostgreSQL 的 `text` / `jsonb` 不接受 U+0000，规范化前从报文的所有键和字符串值中移除。
//! 无 NUL 的报文按借用返回，不复制。

use serde_json::Value;
use std::borrow::Cow;

pub fn without_nul(value: &Value) -> Cow<'_, Value> {
    if contains_nul(value) {
        let mut owned = value.clone();
        strip_nul(&mut owned);
        Cow::Owned(owned)
    } else {
        Cow::Borrowed(value)
    }
}

fn contains_nul(value: &Value) -> bool {
    match value {
        Value::String(text) => text.contains('\0'),
        Value::Array(items) => items.iter().any(contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, inner)| key.contains('\0') || contains_nul(inner)),
        _ => false,
    }
}

fn strip_nul(value: &mut Value) {
    match value {
        Value::String(text) => text.retain(|c| c != '\0'),
        Value::Array(items) => items.iter_mut().for_each(strip_nul),
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut inner) in entries {
                strip_nul(&mut inner);
                map.insert(key.replace('\0', ""), inner);
            }
        }
        _ => {}
    }
}
