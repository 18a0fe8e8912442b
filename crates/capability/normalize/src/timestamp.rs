//! 时间戳解析
//!
//! 支持的格式：
//! - OME 紧凑格式：`20260201T183500Z`（可带小数秒）
//! - RFC 3339：`2026-02-01T18:35:00Z`、`2026-02-01T18:35:00+08:00`
//! - 无时区的 ISO 格式，按 UTC 处理
//! - 整数 epoch：小于 10^11 视为秒，否则视为毫秒
//!
//! 超出 PostgreSQL `timestamptz` 可表示范围的时间视为无效，交给上一级兜底。

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

const SECONDS_THRESHOLD: u64 = 100_000_000_000;

/// `timestamptz` 下界：公元前 4713-11-24T00:00:00Z。
pub const MIN_TS_MS: i64 = -210_866_803_200_000;
/// `timestamptz` 上界（取整秒，写入时经 f64 换算不越界）：294276-12-31T23:59:59Z。
pub const MAX_TS_MS: i64 = 9_224_318_015_999_000;

/// `as i64` 不会饱和的浮点范围。
const F64_CAST_LIMIT: f64 = 9.0e18;

const NAIVE_FORMATS: &[&str] = &[
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// 解析 JSON 中的时间值，返回 epoch 毫秒。
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|v| v.is_finite() && v.abs() < F64_CAST_LIMIT)
                    .map(|v| v as i64)
            })
            .and_then(epoch_to_ms),
        Value::String(raw) => parse_timestamp_str(raw),
        _ => None,
    }
}

/// 解析字符串时间，返回 epoch 毫秒。
pub fn parse_timestamp_str(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return in_range(parsed.timestamp_millis());
    }
    let naive = raw.trim_end_matches(['Z', 'z']);
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
            return in_range(parsed.and_utc().timestamp_millis());
        }
    }
    raw.parse::<i64>().ok().and_then(epoch_to_ms)
}

/// 把兜底时间收敛到可写入范围内。
pub fn clamp_ts(ts_ms: i64) -> i64 {
    ts_ms.clamp(MIN_TS_MS, MAX_TS_MS)
}

fn epoch_to_ms(value: i64) -> Option<i64> {
    let ms = if value.unsigned_abs() < SECONDS_THRESHOLD {
        value.saturating_mul(1000)
    } else {
        value
    };
    in_range(ms)
}

fn in_range(ts_ms: i64) -> Option<i64> {
    (MIN_TS_MS..=MAX_TS_MS).contains(&ts_ms).then_some(ts_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const T_MS: i64 = 1_769_970_900_000; // 2026-02-01T18:35:00Z

    #[test]
    fn parses_ome_compact_format() {
        assert_eq!(parse_timestamp_str("20260201T183500Z"), Some(T_MS));
        assert_eq!(parse_timestamp_str("20260201T183500.250Z"), Some(T_MS + 250));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(parse_timestamp_str("2026-02-01T18:35:00Z"), Some(T_MS));
        assert_eq!(parse_timestamp_str("2026-02-02T02:35:00+08:00"), Some(T_MS));
    }

    #[test]
    fn parses_epoch_seconds_and_millis() {
        assert_eq!(parse_timestamp(&json!(1_769_970_900)), Some(T_MS));
        assert_eq!(parse_timestamp(&json!(T_MS)), Some(T_MS));
        assert_eq!(parse_timestamp(&json!("1769970900")), Some(T_MS));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp_str("yesterday"), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
        assert_eq!(parse_timestamp(&json!({"ts": 1})), None);
    }

    #[test]
    fn extreme_numbers_are_rejected_without_overflow() {
        assert_eq!(parse_timestamp(&json!(i64::MIN)), None);
        assert_eq!(parse_timestamp(&json!(i64::MAX)), None);
        assert_eq!(parse_timestamp(&json!(-1e300)), None);
        assert_eq!(parse_timestamp(&json!(1e300)), None);
        assert_eq!(parse_timestamp(&json!(u64::MAX)), None);
        assert_eq!(parse_timestamp_str("-9223372036854775808"), None);
    }

    #[test]
    fn timestamps_outside_storage_range_are_rejected() {
        assert_eq!(parse_timestamp(&json!(99_999_999_999_999_999i64)), None);
        assert_eq!(parse_timestamp(&json!(MAX_TS_MS)), Some(MAX_TS_MS));
        assert_eq!(parse_timestamp(&json!(MAX_TS_MS + 1)), None);
        assert_eq!(parse_timestamp(&json!(MIN_TS_MS - 1)), None);
        assert_eq!(parse_timestamp_str("-262000-01-01T00:00:00Z"), None);
        assert_eq!(parse_timestamp(&json!(-1_000)), Some(-1_000_000));
        assert_eq!(clamp_ts(i64::MAX), MAX_TS_MS);
        assert_eq!(clamp_ts(i64::MIN), MIN_TS_MS);
        assert_eq!(clamp_ts(T_MS), T_MS);
    }
}
