use domain::{AlarmEvent, AlarmNotification, DeviceState, FieldValue, PushEvent, RoomId};

fn bare_alarm() -> AlarmEvent {
    AlarmEvent {
        id: None,
        device_id: Some("esp32_04".to_string()),
        device_name: None,
        alarm_code: Some("HT-01".to_string()),
        description: None,
        value: Some(FieldValue::F64(51.5)),
        severity: None,
        status: Some(" ".to_string()),
        ts_ms: 1_700_000_000_000,
        plant_id: None,
        plant_name: None,
    }
}

#[test]
fn alarm_notification_fills_defaults() {
    let notification = AlarmNotification::from_alarm(&bare_alarm());
    assert_eq!(notification.device_id, "esp32_04");
    assert_eq!(notification.device_name, "Unknown Device");
    assert_eq!(notification.plant_name, "Unknown Plant");
    assert_eq!(notification.severity, "Warning");
    assert_eq!(notification.status, "New");
    assert_eq!(notification.alarm_code.as_deref(), Some("HT-01"));
    assert_eq!(notification.timestamp, 1_700_000_000_000);
}

#[test]
fn alarm_notification_keeps_reported_values() {
    let mut alarm = bare_alarm();
    alarm.device_name = Some("Tank esp32_04".to_string());
    alarm.plant_name = Some("Plant D".to_string());
    alarm.severity = Some("Critical".to_string());
    let notification = AlarmNotification::from_alarm(&alarm);
    assert_eq!(notification.device_name, "Tank esp32_04");
    assert_eq!(notification.plant_name, "Plant D");
    assert_eq!(notification.severity, "Critical");
}

#[test]
fn room_ids_render_with_prefix() {
    assert_eq!(RoomId::device("esp32_04").to_string(), "device:esp32_04");
    assert_eq!(RoomId::site("2").to_string(), "plant:2");
    assert_eq!(PushEvent::AlarmNotification.as_str(), "alarm_notification");
}

#[test]
fn field_value_accepts_scalars_only() {
    assert_eq!(
        FieldValue::from_json(&serde_json::json!(42)),
        Some(FieldValue::I64(42))
    );
    assert_eq!(
        FieldValue::from_json(&serde_json::json!(21.5)),
        Some(FieldValue::F64(21.5))
    );
    assert_eq!(FieldValue::from_json(&serde_json::Value::Null), None);
    assert_eq!(FieldValue::from_json(&serde_json::json!({ "a": 1 })), None);
}

#[test]
fn device_state_serializes_camel_case() {
    let mut state = DeviceState::empty("esp32_04");
    state.fields.insert("temperature".to_string(), FieldValue::I64(42));
    state.field_timestamps.insert("temperature".to_string(), 10);
    state.last_updated_ms = 10;
    let json = serde_json::to_value(&state).expect("serialize");
    assert_eq!(json["deviceId"], "esp32_04");
    assert_eq!(json["lastUpdated"], 10);
    assert_eq!(json["fields"]["temperature"], 42);
    assert_eq!(json["fieldTimestamps"]["temperature"], 10);
    assert_eq!(json["isPartial"], true);
}
