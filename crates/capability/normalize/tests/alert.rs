use domain::Severity;
use ome_normalize::{UNKNOWN_DEVICE, normalize_alerts};
use serde_json::json;

const BROKER_TS: i64 = 1_767_225_600_000;

#[test]
fn unknown_severity_maps_to_unknown_tier() {
    let out = normalize_alerts(
        &json!({"AlertIdentifier": "77", "DeviceId": "SVC1", "Severity": "apocalyptic"}),
        BROKER_TS,
    )
    .unwrap();
    assert_eq!(out.alerts.len(), 1);
    assert_eq!(out.alerts[0].severity, Severity::Unknown);
    assert_eq!(out.alerts[0].ts_ms, BROKER_TS);
}

#[test]
fn ome_alert_fields_are_mapped() {
    let raw = json!({
        "AlertIdentifier": 9001,
        "SystemServiceTag": "SVC123",
        "DeviceName": "rack-12",
        "Severity": 16,
        "Category": "System Health",
        "Description": "The system board temperature is above threshold.",
        "TimeStamp": "20260201T183500Z",
        "Acknowledged": true
    });
    let out = normalize_alerts(&raw, BROKER_TS).unwrap();
    let alert = &out.alerts[0];
    assert_eq!(alert.device_id, "SVC123");
    assert_eq!(alert.source_alert_id.as_deref(), Some("9001"));
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.category.as_deref(), Some("System Health"));
    assert_eq!(alert.ts_ms, 1_769_970_900_000);
    assert!(alert.acknowledged);
    assert!(alert.details.as_deref().is_some_and(|d| d.contains("\"AlertIdentifier\":9001")));
    assert_eq!(out.devices[0].display_name.as_deref(), Some("rack-12"));
}

#[test]
fn device_is_recovered_from_description() {
    let out = normalize_alerts(
        &json!({
            "Severity": "warning",
            "Description": "PSU lost redundancy. System Service Tag: ABC9X1, Device Display Name: web-03, Message ID: PSU1204"
        }),
        BROKER_TS,
    )
    .unwrap();
    let alert = &out.alerts[0];
    assert_eq!(alert.device_id, "ABC9X1");
    assert_eq!(alert.category.as_deref(), Some("PSU1204"));
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(out.devices[0].display_name.as_deref(), Some("web-03"));
}

#[test]
fn alert_without_any_device_uses_placeholder() {
    let out = normalize_alerts(&json!({"Severity": 2, "Message": "test"}), BROKER_TS).unwrap();
    assert_eq!(out.alerts[0].device_id, UNKNOWN_DEVICE);
    assert_eq!(out.alerts[0].message.as_deref(), Some("test"));
}

#[test]
fn container_is_one_to_many() {
    let out = normalize_alerts(
        &json!({"Data": [
            {"AlertIdentifier": "1", "DeviceId": "A", "Severity": 8},
            {"AlertIdentifier": "2", "DeviceId": "B", "Severity": 4}
        ]}),
        BROKER_TS,
    )
    .unwrap();
    assert_eq!(out.alerts.len(), 2);
    assert_eq!(out.alerts[1].device_id, "B");
    assert_eq!(out.alerts[1].severity, Severity::Normal);
}

#[test]
fn fingerprint_is_stable_across_redelivery() {
    let with_id = json!({"AlertIdentifier": "5", "DeviceId": "A", "TimeStamp": "20260201T183500Z"});
    let first = normalize_alerts(&with_id, BROKER_TS).unwrap();
    let again = normalize_alerts(&with_id, BROKER_TS + 60_000).unwrap();
    assert_eq!(first.alerts[0].alert_id, again.alerts[0].alert_id);

    let anonymous = json!({"DeviceId": "A", "Severity": 8, "Message": "fan"});
    let first = normalize_alerts(&anonymous, BROKER_TS).unwrap();
    let reordered = json!({"Message": "fan", "Severity": 8, "DeviceId": "A"});
    let again = normalize_alerts(&reordered, BROKER_TS).unwrap();
    assert_eq!(first.alerts[0].alert_id, again.alerts[0].alert_id);

    let other = normalize_alerts(&json!({"DeviceId": "A", "Severity": 8, "Message": "psu"}), BROKER_TS).unwrap();
    assert_ne!(first.alerts[0].alert_id, other.alerts[0].alert_id);
}

#[test]
fn non_object_alert_is_rejected() {
    assert!(normalize_alerts(&json!(42), BROKER_TS).is_err());
    assert!(normalize_alerts(&json!({"Data": ["x"]}), BROKER_TS).is_err());
}

#[test]
fn nul_characters_never_reach_alert_details() {
    let raw = json!({
        "AlertIdentifier": "A\u{0}1",
        "DeviceId": "SVC1",
        "Severity": 8,
        "Message": "fan\u{0} failure",
        "Extra": {"note": "x\u{0}"}
    });
    let out = normalize_alerts(&raw, BROKER_TS).unwrap();
    let alert = &out.alerts[0];
    assert_eq!(alert.source_alert_id.as_deref(), Some("A1"));
    assert_eq!(alert.message.as_deref(), Some("fan failure"));
    let details = alert.details.as_deref().unwrap();
    assert!(!details.contains('\0'));
    assert!(!details.contains("\\u0000"));
    assert!(details.contains("\"note\":\"x\""));
}

#[test]
fn extreme_alert_timestamp_uses_broker_time() {
    let raw = json!({"DeviceId": "SVC1", "Severity": 8, "TimeStamp": i64::MIN});
    let out = normalize_alerts(&raw, BROKER_TS).unwrap();
    assert_eq!(out.alerts[0].ts_ms, BROKER_TS);
}
