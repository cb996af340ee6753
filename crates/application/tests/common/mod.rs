#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    BackendClient, BackendError, DeviceEvent, DeviceInfo, DeviceRecord, DomainError, Entity, EntityId,
    EntityRegistry, IngestOutcome, MappingObserver, MappingSnapshot, MappingStore, Reading,
    StateBus, StateChanged, StateListener, Subscription, SyncOutcome,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

pub fn id(s: &str) -> EntityId {
    EntityId::new(s).unwrap()
}

pub fn selection(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

// --- Runtime registry ---

#[derive(Default)]
struct RegistryState {
    entities: BTreeMap<String, Entity>,
    parents: HashMap<String, String>,
    devices: HashMap<String, DeviceInfo>,
}

#[derive(Default)]
pub struct FakeRegistry {
    state: StdMutex<RegistryState>,
}

impl FakeRegistry {
    pub fn add(&self, entity: Entity, parent: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        if let Some(parent) = parent {
            state
                .parents
                .insert(entity.entity_id.to_string(), parent.to_string());
        }
        state.entities.insert(entity.entity_id.to_string(), entity);
    }

    pub fn add_device(&self, device_id: &str, name: &str, manufacturer: &str) {
        self.state.lock().unwrap().devices.insert(
            device_id.to_string(),
            DeviceInfo {
                name: Some(name.to_string()),
                manufacturer: Some(manufacturer.to_string()),
                model: None,
            },
        );
    }

    /// Update an entity's state and return the change event for it
    pub fn set_state(&self, entity_id: &str, new_state: &str) -> StateChanged {
        let mut state = self.state.lock().unwrap();
        let old = state.entities.get(entity_id).cloned();
        let mut entity = old.clone().expect("unknown entity");
        entity.state = new_state.to_string();
        state.entities.insert(entity_id.to_string(), entity.clone());
        StateChanged {
            entity_id: id(entity_id),
            old_state: old,
            new_state: Some(entity),
        }
    }
}

impl EntityRegistry for FakeRegistry {
    fn parent_device(&self, entity_id: &EntityId) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .parents
            .get(entity_id.as_str())
            .cloned()
    }

    fn device_info(&self, device_id: &str) -> Option<DeviceInfo> {
        self.state.lock().unwrap().devices.get(device_id).cloned()
    }

    fn entities_in(&self, domain: &str) -> Vec<Entity> {
        self.state
            .lock()
            .unwrap()
            .entities
            .values()
            .filter(|e| e.domain() == domain)
            .cloned()
            .collect()
    }

    fn entity_platform(&self, _entity_id: &EntityId) -> Option<String> {
        None
    }

    fn state_of(&self, entity_id: &EntityId) -> Option<Entity> {
        self.state
            .lock()
            .unwrap()
            .entities
            .get(entity_id.as_str())
            .cloned()
    }
}

/// Water heater with a power sensor, both under parent device `dev-1`
pub fn water_heater_registry() -> Arc<FakeRegistry> {
    let registry = Arc::new(FakeRegistry::default());
    registry.add_device("dev-1", "Water Heater", "Acme");
    registry.add(
        Entity::new(id("sensor.wh_power"), "2000")
            .with_device_class("power")
            .with_unit("W"),
        Some("dev-1"),
    );
    registry.add(
        Entity::new(id("water_heater.wh"), "eco")
            .with_attribute("current_temperature", json!(62))
            .with_attribute("temperature", json!(65)),
        Some("dev-1"),
    );
    registry
}

// --- State bus ---

type Listeners = Arc<StdMutex<Vec<(u64, HashSet<EntityId>, Arc<dyn StateListener>)>>>;

#[derive(Default)]
pub struct FakeBus {
    listeners: Listeners,
    next_id: AtomicU64,
}

struct FakeSubscription {
    id: u64,
    listeners: Listeners,
}

impl Subscription for FakeSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(id, _, _)| *id != self.id);
    }
}

impl FakeBus {
    pub async fn emit(&self, change: StateChanged) {
        let targets: Vec<Arc<dyn StateListener>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, ids, _)| ids.contains(&change.entity_id))
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in targets {
            listener.on_state_changed(change.clone()).await;
        }
    }

    pub fn subscriptions(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Entity ids tracked across all live subscriptions
    pub fn tracked(&self) -> HashSet<String> {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, ids, _)| ids.iter().map(|id| id.to_string()))
            .collect()
    }
}

impl StateBus for FakeBus {
    fn track(
        &self,
        entity_ids: HashSet<EntityId>,
        listener: Arc<dyn StateListener>,
    ) -> Box<dyn Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap()
            .push((id, entity_ids, listener));
        Box::new(FakeSubscription {
            id,
            listeners: self.listeners.clone(),
        })
    }
}

// --- Backend with fault injection ---

#[derive(Default)]
pub struct FakeBackend {
    pub sync_calls: Mutex<Vec<Vec<DeviceRecord>>>,
    pub batches: Mutex<Vec<Vec<Reading>>>,
    pub device_mappings: Mutex<BTreeMap<String, String>>,
    pub fail_sync: AtomicBool,
    pub fail_push: AtomicBool,
    pub sync_delay: Mutex<Duration>,
    pub push_delay: Mutex<Duration>,
    pub events: Mutex<Vec<DeviceEvent>>,
    pub fail_events: AtomicBool,
}

impl FakeBackend {
    pub fn mapping(pairs: &[(&str, &str)]) -> Arc<Self> {
        let backend = Self::default();
        *backend.device_mappings.try_lock().unwrap() = pairs
            .iter()
            .map(|(l, r)| (l.to_string(), r.to_string()))
            .collect();
        Arc::new(backend)
    }

    pub async fn sync_count(&self) -> usize {
        self.sync_calls.lock().await.len()
    }

    pub async fn batch_count(&self) -> usize {
        self.batches.lock().await.len()
    }

    pub async fn last_batch(&self) -> Vec<Reading> {
        self.batches.lock().await.last().cloned().unwrap_or_default()
    }

    /// Every reading pushed in batches after the first `skip`
    pub async fn readings_since(&self, skip: usize) -> Vec<Reading> {
        self.batches
            .lock()
            .await
            .iter()
            .skip(skip)
            .flatten()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn sync_devices(
        &self,
        _site_id: &str,
        devices: &[DeviceRecord],
    ) -> Result<SyncOutcome, BackendError> {
        let delay = *self.sync_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.sync_calls.lock().await.push(devices.to_vec());
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("simulated outage".to_string()));
        }
        Ok(SyncOutcome {
            created: devices.len() as u32,
            updated: 0,
            removed: 0,
            device_mappings: self.device_mappings.lock().await.clone(),
        })
    }

    async fn push_telemetry(
        &self,
        _site_id: &str,
        _timestamp: DateTime<Utc>,
        readings: &[Reading],
    ) -> Result<IngestOutcome, BackendError> {
        let delay = *self.push_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(BackendError::Server {
                status: 503,
                message: "simulated outage".to_string(),
            });
        }
        self.batches.lock().await.push(readings.to_vec());
        Ok(IngestOutcome {
            ingested: readings.len() as u32,
        })
    }

    async fn report_events(
        &self,
        _site_id: &str,
        events: &[DeviceEvent],
    ) -> Result<IngestOutcome, BackendError> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("simulated outage".to_string()));
        }
        self.events.lock().await.extend_from_slice(events);
        Ok(IngestOutcome {
            ingested: events.len() as u32,
        })
    }
}

// --- Mapping observer and store ---

#[derive(Default)]
pub struct RecordingObserver {
    pub received: Mutex<Vec<Arc<MappingSnapshot>>>,
    pub fail: bool,
}

#[async_trait]
impl MappingObserver for RecordingObserver {
    async fn mappings_updated(
        &self,
        snapshot: Arc<MappingSnapshot>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.received.lock().await.push(snapshot);
        if self.fail {
            return Err("observer exploded".into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<Option<MappingSnapshot>>,
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn load(&self) -> Result<Option<MappingSnapshot>, DomainError> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, snapshot: &MappingSnapshot) -> Result<(), DomainError> {
        *self.saved.lock().await = Some(snapshot.clone());
        Ok(())
    }
}
