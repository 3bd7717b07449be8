use domain::{DeviceState, FieldValue};
use gms_state::{DeviceStateStore, StateStoreConfig};
use std::sync::Arc;
use std::time::Duration;

fn sample_state(device_id: &str, temperature: i64) -> DeviceState {
    let mut state = DeviceState::empty(device_id);
    state
        .fields
        .insert("temperature".to_string(), FieldValue::I64(temperature));
    state.field_timestamps.insert("temperature".to_string(), 1000);
    state.last_updated_ms = 1000;
    state.is_partial = false;
    state
}

fn short_ttl() -> StateStoreConfig {
    StateStoreConfig {
        ttl: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn put_get_delete_roundtrip() {
    let store = DeviceStateStore::new();
    assert!(store.get("esp32_01").is_none());

    store.put("esp32_01", sample_state("esp32_01", 21));
    store.put("esp32_02", sample_state("esp32_02", 30));

    let state = store.get("esp32_01").expect("state");
    assert_eq!(state.fields["temperature"], FieldValue::I64(21));
    assert_eq!(
        store.keys().into_iter().collect::<Vec<_>>(),
        vec!["esp32_01".to_string(), "esp32_02".to_string()]
    );
    assert_eq!(store.all().len(), 2);

    assert!(store.delete("esp32_01"));
    assert!(!store.delete("esp32_01"));
    assert!(store.get("esp32_01").is_none());
    assert_eq!(store.len(), 1);

    assert_eq!(store.clear(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn update_sees_previous_value() {
    let store = DeviceStateStore::new();
    let first = store.update("esp32_01", |previous| {
        assert!(previous.is_none());
        sample_state("esp32_01", 21)
    });
    assert_eq!(first.fields["temperature"], FieldValue::I64(21));

    let second = store.update("esp32_01", |previous| {
        let mut next = previous.cloned().expect("previous");
        next.fields
            .insert("humidity".to_string(), FieldValue::I64(55));
        next
    });
    assert_eq!(second.fields.len(), 2);
    assert_eq!(store.get("esp32_01"), Some(second));
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_idle_ttl() {
    let store = DeviceStateStore::with_config(short_ttl());
    store.put("esp32_01", sample_state("esp32_01", 21));

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(store.get("esp32_01").is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.get("esp32_01").is_none());
    assert!(store.keys().is_empty());
    // 读取时已惰性清理
    assert_eq!(store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn write_refreshes_expiry() {
    let store = DeviceStateStore::with_config(short_ttl());
    store.put("esp32_01", sample_state("esp32_01", 21));

    tokio::time::advance(Duration::from_secs(40)).await;
    store.put("esp32_01", sample_state("esp32_01", 22));

    tokio::time::advance(Duration::from_secs(40)).await;
    let state = store.get("esp32_01").expect("still cached");
    assert_eq!(state.fields["temperature"], FieldValue::I64(22));
}

#[tokio::test(start_paused = true)]
async fn update_treats_expired_entry_as_absent() {
    let store = DeviceStateStore::with_config(short_ttl());
    store.put("esp32_01", sample_state("esp32_01", 21));

    tokio::time::advance(Duration::from_secs(61)).await;
    store.update("esp32_01", |previous| {
        assert!(previous.is_none());
        DeviceState::empty("esp32_01")
    });
    assert!(store.get("esp32_01").is_some());
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_expired_entries() {
    let store = Arc::new(DeviceStateStore::with_config(short_ttl()));
    store.put("esp32_01", sample_state("esp32_01", 21));
    store.put("esp32_02", sample_state("esp32_02", 22));
    let sweeper = store.spawn_sweeper();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.len(), 2);

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(store.len(), 0);

    sweeper.abort();
}

#[tokio::test]
async fn zero_durations_are_clamped() {
    let store = DeviceStateStore::with_config(StateStoreConfig {
        ttl: Duration::ZERO,
        sweep_interval: Duration::ZERO,
    });
    assert_eq!(store.config().ttl, Duration::from_secs(1));
    assert_eq!(store.config().sweep_interval, Duration::from_secs(1));
}
