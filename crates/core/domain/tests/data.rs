use domain::{EventKind, MetricValue};

#[test]
fn event_kind_names_match_log_fields() {
    assert_eq!(EventKind::Telemetry.as_str(), "telemetry");
    assert_eq!(EventKind::Alert.as_str(), "alert");
    assert_eq!(EventKind::Health.as_str(), "health");
}

#[test]
fn boolean_metrics_have_numeric_and_text_views() {
    assert_eq!(MetricValue::Bool(true).as_f64(), Some(1.0));
    assert_eq!(MetricValue::Bool(false).as_text().as_deref(), Some("false"));
    assert_eq!(MetricValue::Text("on".to_string()).as_f64(), None);
}
