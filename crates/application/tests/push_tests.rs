mod common;

use application::{DiscoveryEngine, MappingSynchronizer, PushSettings, TelemetryPushService};
use common::*;
use domain::{
    Capability, ClassifierRules, DeviceEventType, Entity, EntityMapping, MappingObserver,
    MappingSnapshot,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_secs(30);
const HEARTBEAT: Duration = Duration::from_secs(60);

/// Let spawned flushes and event reports run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

struct Harness {
    registry: Arc<FakeRegistry>,
    bus: Arc<FakeBus>,
    backend: Arc<FakeBackend>,
    service: Arc<TelemetryPushService>,
}

fn harness(registry: Arc<FakeRegistry>, max_batch_size: usize) -> Harness {
    let bus = Arc::new(FakeBus::default());
    let backend = FakeBackend::mapping(&[]);
    let service = Arc::new(TelemetryPushService::new(
        PushSettings {
            site_id: "site-1".to_string(),
            debounce: DEBOUNCE,
            heartbeat: HEARTBEAT,
            max_batch_size,
        },
        backend.clone(),
        registry.clone(),
        bus.clone(),
    ));
    Harness {
        registry,
        bus,
        backend,
        service,
    }
}

fn mapping(entries: &[(&str, &str, Capability)]) -> Arc<MappingSnapshot> {
    let mut snapshot = MappingSnapshot::default();
    for (entity_id, remote_id, capability) in entries {
        snapshot
            .device_ids
            .insert(format!("group-{remote_id}"), remote_id.to_string());
        snapshot.entities.insert(
            id(entity_id),
            EntityMapping {
                remote_device_id: remote_id.to_string(),
                capability: *capability,
                local_group_id: format!("group-{remote_id}"),
            },
        );
    }
    Arc::new(snapshot)
}

/// Three meters, each its own remote device
fn meters_registry() -> Arc<FakeRegistry> {
    let registry = Arc::new(FakeRegistry::default());
    for name in ["a", "b", "c"] {
        registry.add(
            Entity::new(id(&format!("sensor.meter_{name}_power")), "100")
                .with_device_class("power")
                .with_unit("W"),
            None,
        );
    }
    registry
}

fn meters_mapping() -> Arc<MappingSnapshot> {
    mapping(&[
        ("sensor.meter_a_power", "remote-a", Capability::Power),
        ("sensor.meter_b_power", "remote-b", Capability::Power),
        ("sensor.meter_c_power", "remote-c", Capability::Power),
    ])
}

#[tokio::test]
async fn test_water_heater_end_to_end() {
    tokio::time::pause();

    let h = harness(water_heater_registry(), 50);
    *h.backend.device_mappings.lock().await =
        BTreeMap::from([("dev-1".to_string(), "remote-42".to_string())]);

    let sync = Arc::new(MappingSynchronizer::new(
        DiscoveryEngine::new(h.registry.clone(), ClassifierRules::default()),
        h.backend.clone(),
        "site-1",
        selection(&["dev-1"]),
        Duration::from_secs(300),
    ));
    sync.register(h.service.clone()).await;
    sync.start().await;

    let snapshot = sync.snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot
        .entities
        .values()
        .all(|m| m.remote_device_id == "remote-42"));

    h.service.start().await;

    // Initial snapshot: one merged reading for the device
    assert_eq!(h.backend.batch_count().await, 1);
    let initial = h.backend.last_batch().await;
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].power_w, Some(2000.0));
    assert_eq!(initial[0].temperature_c, Some(62.0));
    assert_eq!(initial[0].target_temperature_c, Some(65.0));

    let change = h.registry.set_state("sensor.wh_power", "1800");
    h.bus.emit(change).await;
    assert_eq!(h.backend.batch_count().await, 1);

    tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;

    assert_eq!(h.backend.batch_count().await, 2);
    let batch = h.backend.last_batch().await;
    assert_eq!(
        serde_json::to_value(&batch).unwrap(),
        json!([{"device_id": "remote-42", "power_w": 1800.0}])
    );

    h.service.stop().await;
    sync.stop().await;
}

#[tokio::test]
async fn test_debounce_coalesces_events_into_one_batch() {
    tokio::time::pause();

    let h = harness(meters_registry(), 50);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;
    let after_start = h.backend.batch_count().await;

    for (entity, value) in [
        ("sensor.meter_a_power", "110"),
        ("sensor.meter_b_power", "220"),
        ("sensor.meter_a_power", "115"),
        ("sensor.meter_c_power", "330"),
    ] {
        h.bus.emit(h.registry.set_state(entity, value)).await;
    }

    tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;

    assert_eq!(h.backend.batch_count().await, after_start + 1);
    let batch = h.backend.last_batch().await;
    assert_eq!(batch.len(), 3);
    let a = batch.iter().find(|r| r.device_id == "remote-a").unwrap();
    assert_eq!(a.power_w, Some(115.0));

    h.service.stop().await;
}

#[tokio::test]
async fn test_failed_flush_requeues_readings() {
    tokio::time::pause();

    let h = harness(meters_registry(), 50);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;
    let after_start = h.backend.batch_count().await;

    h.backend.fail_push.store(true, Ordering::SeqCst);
    h.bus
        .emit(h.registry.set_state("sensor.meter_b_power", "250"))
        .await;
    tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;

    assert_eq!(h.backend.batch_count().await, after_start);
    assert_eq!(
        h.service.pending_reading("remote-b").await.unwrap().power_w,
        Some(250.0)
    );

    h.backend.fail_push.store(false, Ordering::SeqCst);
    assert_eq!(h.service.flush().await.unwrap(), 1);
    let batch = h.backend.last_batch().await;
    assert_eq!(batch[0].device_id, "remote-b");
    assert_eq!(batch[0].power_w, Some(250.0));
    assert_eq!(h.service.pending_devices().await, 0);

    h.service.stop().await;
}

#[tokio::test]
async fn test_max_batch_size_flushes_immediately() {
    tokio::time::pause();

    let h = harness(meters_registry(), 2);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;
    let after_start = h.backend.batch_count().await;

    h.bus
        .emit(h.registry.set_state("sensor.meter_a_power", "1"))
        .await;
    assert_eq!(h.backend.batch_count().await, after_start);

    h.bus
        .emit(h.registry.set_state("sensor.meter_b_power", "2"))
        .await;
    settle().await;
    assert_eq!(h.backend.batch_count().await, after_start + 1);
    assert_eq!(h.backend.last_batch().await.len(), 2);

    h.service.stop().await;
}

#[tokio::test]
async fn test_unmapped_and_unavailable_states_are_dropped() {
    tokio::time::pause();

    let registry = meters_registry();
    registry.add(
        Entity::new(id("sensor.unmapped_power"), "5").with_device_class("power"),
        None,
    );
    let h = harness(registry, 50);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;

    h.service
        .handle_state_change(h.registry.set_state("sensor.unmapped_power", "6"))
        .await;
    h.bus
        .emit(h.registry.set_state("sensor.meter_a_power", "unavailable"))
        .await;

    assert_eq!(h.service.pending_devices().await, 0);
    h.service.stop().await;
}

#[tokio::test]
async fn test_heartbeat_repushes_current_values() {
    tokio::time::pause();

    let h = harness(meters_registry(), 50);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;
    assert_eq!(h.backend.batch_count().await, 1);

    tokio::time::sleep(HEARTBEAT + Duration::from_secs(1)).await;

    assert_eq!(h.backend.batch_count().await, 2);
    assert_eq!(h.backend.last_batch().await.len(), 3);

    h.service.stop().await;
}

#[tokio::test]
async fn test_stop_flushes_pending_and_unsubscribes() {
    tokio::time::pause();

    let h = harness(meters_registry(), 50);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;
    assert_eq!(h.bus.subscriptions(), 1);
    let after_start = h.backend.batch_count().await;

    h.bus
        .emit(h.registry.set_state("sensor.meter_c_power", "999"))
        .await;
    h.service.stop().await;

    assert_eq!(h.bus.subscriptions(), 0);
    assert_eq!(h.backend.batch_count().await, after_start + 1);
    assert_eq!(h.backend.last_batch().await[0].power_w, Some(999.0));
    assert!(!h.service.is_running());
}

#[tokio::test]
async fn test_mapping_change_resubscribes_and_prunes() {
    tokio::time::pause();

    let h = harness(meters_registry(), 50);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;

    h.backend.fail_push.store(true, Ordering::SeqCst);
    h.bus
        .emit(h.registry.set_state("sensor.meter_c_power", "10"))
        .await;
    assert_eq!(h.service.pending_devices().await, 1);

    let reduced = mapping(&[
        ("sensor.meter_a_power", "remote-a", Capability::Power),
        ("sensor.meter_b_power", "remote-b", Capability::Power),
    ]);
    h.service.mappings_updated(reduced).await.unwrap();

    assert_eq!(h.service.pending_devices().await, 0);
    assert_eq!(h.bus.subscriptions(), 1);
    assert!(!h.bus.tracked().contains("sensor.meter_c_power"));
    assert!(h.bus.tracked().contains("sensor.meter_a_power"));

    h.backend.fail_push.store(false, Ordering::SeqCst);
    h.service.stop().await;
}

#[tokio::test]
async fn test_sensor_reading_carries_switch_state() {
    tokio::time::pause();

    let registry = Arc::new(FakeRegistry::default());
    registry.add(
        Entity::new(id("sensor.boiler_power"), "0").with_device_class("power"),
        None,
    );
    registry.add(Entity::new(id("switch.boiler"), "off"), None);
    let h = harness(registry, 50);
    h.service
        .mappings_updated(mapping(&[
            ("sensor.boiler_power", "remote-wh", Capability::Power),
            ("switch.boiler", "remote-wh", Capability::OnOff),
        ]))
        .await
        .unwrap();
    h.service.start().await;

    h.bus
        .emit(h.registry.set_state("sensor.boiler_power", "2000"))
        .await;
    tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;

    let batch = h.backend.last_batch().await;
    assert_eq!(batch[0].power_w, Some(2000.0));
    assert_eq!(batch[0].is_on, Some(false));

    h.service.stop().await;
}

#[tokio::test]
async fn test_slow_backend_does_not_block_state_changes() {
    tokio::time::pause();

    let h = harness(meters_registry(), 1);
    h.service.mappings_updated(meters_mapping()).await.unwrap();
    h.service.start().await;
    let after_start = h.backend.batch_count().await;
    *h.backend.push_delay.lock().await = Duration::from_secs(30);

    let started = tokio::time::Instant::now();
    for (entity, value) in [
        ("sensor.meter_a_power", "1"),
        ("sensor.meter_b_power", "2"),
        ("sensor.meter_c_power", "3"),
    ] {
        h.bus.emit(h.registry.set_state(entity, value)).await;
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    tokio::time::sleep(Duration::from_secs(120)).await;

    let delivered = h.backend.readings_since(after_start).await;
    for (device, power) in [("remote-a", 1.0), ("remote-b", 2.0), ("remote-c", 3.0)] {
        let reading = delivered.iter().find(|r| r.device_id == device).unwrap();
        assert_eq!(reading.power_w, Some(power));
    }

    *h.backend.push_delay.lock().await = Duration::ZERO;
    h.service.stop().await;
}

fn boiler_harness() -> Harness {
    let registry = Arc::new(FakeRegistry::default());
    registry.add(
        Entity::new(id("sensor.boiler_power"), "0").with_device_class("power"),
        None,
    );
    registry.add(Entity::new(id("switch.boiler"), "off"), None);
    harness(registry, 50)
}

fn boiler_mapping() -> Arc<MappingSnapshot> {
    mapping(&[
        ("sensor.boiler_power", "remote-wh", Capability::Power),
        ("switch.boiler", "remote-wh", Capability::OnOff),
    ])
}

#[tokio::test]
async fn test_on_off_flip_reports_device_event() {
    tokio::time::pause();

    let h = boiler_harness();
    h.service.mappings_updated(boiler_mapping()).await.unwrap();
    h.service.start().await;

    // First observation only records the state
    h.bus.emit(h.registry.set_state("switch.boiler", "on")).await;
    settle().await;
    assert!(h.backend.events.lock().await.is_empty());

    h.bus.emit(h.registry.set_state("switch.boiler", "off")).await;
    settle().await;

    let events = h.backend.events.lock().await.clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, "remote-wh");
    assert_eq!(events[0].event_type, DeviceEventType::PowerOff);

    // Same state again is not a transition
    h.bus
        .emit(h.registry.set_state("sensor.boiler_power", "0"))
        .await;
    settle().await;
    assert_eq!(h.backend.events.lock().await.len(), 1);

    h.service.stop().await;
}

#[tokio::test]
async fn test_failed_event_report_keeps_pipeline_running() {
    tokio::time::pause();

    let h = boiler_harness();
    h.service.mappings_updated(boiler_mapping()).await.unwrap();
    h.service.start().await;
    h.backend.fail_events.store(true, Ordering::SeqCst);

    h.bus.emit(h.registry.set_state("switch.boiler", "on")).await;
    h.bus.emit(h.registry.set_state("switch.boiler", "off")).await;
    settle().await;

    assert!(h.backend.events.lock().await.is_empty());
    assert_eq!(
        h.service.pending_reading("remote-wh").await.unwrap().is_on,
        Some(false)
    );

    tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;
    assert_eq!(h.backend.last_batch().await[0].is_on, Some(false));

    h.service.stop().await;
}
