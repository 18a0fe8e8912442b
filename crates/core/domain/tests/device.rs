use domain::{DeviceFragment, DeviceRef};

fn fragment(name: Option<&str>, model: Option<&str>, seen_at_ms: i64) -> DeviceFragment {
    DeviceFragment {
        device_id: "SVC123".to_string(),
        display_name: name.map(str::to_string),
        model: model.map(str::to_string),
        seen_at_ms,
    }
}

#[test]
fn merge_keeps_known_fields_when_new_value_empty() {
    let mut device = DeviceRef::from_fragment(&fragment(Some("rack-01"), Some("R750"), 1000));
    device.merge(&fragment(Some(""), None, 2000));

    assert_eq!(device.display_name.as_deref(), Some("rack-01"));
    assert_eq!(device.model.as_deref(), Some("R750"));
    assert_eq!(device.last_seen_ms, 2000);
}

#[test]
fn merge_never_moves_last_seen_backwards() {
    let mut device = DeviceRef::from_fragment(&fragment(None, None, 5000));
    device.merge(&fragment(Some("rack-01"), None, 1000));

    assert_eq!(device.last_seen_ms, 5000);
    assert_eq!(device.display_name.as_deref(), Some("rack-01"));
}

#[test]
fn merge_converges_in_any_order() {
    let fragments = [
        fragment(Some("X"), None, 1),
        fragment(None, Some("Y"), 2),
        fragment(Some("X"), Some("Y"), 3),
    ];
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let mut results = Vec::new();
    for order in orders {
        let mut device = DeviceRef::from_fragment(&fragments[order[0]]);
        device.merge(&fragments[order[1]]);
        device.merge(&fragments[order[2]]);
        results.push(device);
    }
    for device in &results {
        assert_eq!(device, &results[0]);
    }
    assert_eq!(results[0].display_name.as_deref(), Some("X"));
    assert_eq!(results[0].model.as_deref(), Some("Y"));
    assert_eq!(results[0].last_seen_ms, 3);
}
