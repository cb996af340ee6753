use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::entity::STATE_UNKNOWN;
use domain::{
    DeviceInfo, Entity, EntityId, EntityRegistry, StateBus, StateChanged, StateListener,
    Subscription,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::RuntimeSnapshot;

const EVENT_CAPACITY: usize = 512;

#[derive(Default)]
struct Registries {
    entities: BTreeMap<EntityId, Entity>,
    parents: HashMap<EntityId, String>,
    platforms: HashMap<EntityId, String>,
    devices: HashMap<String, DeviceInfo>,
}

/// Process-local stand-in for the home-automation runtime: entity and device
/// registries plus a state bus broadcasting every change.
pub struct InMemoryRuntime {
    registries: RwLock<Registries>,
    events: broadcast::Sender<StateChanged>,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registries: RwLock::new(Registries::default()),
            events,
        }
    }

    pub fn from_snapshot(snapshot: RuntimeSnapshot) -> Self {
        let runtime = Self::new();
        {
            let mut registries = runtime.write();
            registries.devices.extend(snapshot.devices);
            for item in snapshot.entities {
                let id = item.entity.entity_id.clone();
                if let Some(device_id) = item.device_id {
                    registries.parents.insert(id.clone(), device_id);
                }
                if let Some(platform) = item.platform {
                    registries.platforms.insert(id.clone(), platform);
                }
                registries.entities.insert(id, item.entity);
            }
        }
        runtime
    }

    pub fn len(&self) -> usize {
        self.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entities.is_empty()
    }

    pub fn add_device(&self, device_id: impl Into<String>, info: DeviceInfo) {
        self.write().devices.insert(device_id.into(), info);
    }

    /// Register or replace an entity together with its registry relations
    pub fn upsert(&self, entity: Entity, device_id: Option<String>, platform: Option<String>) {
        let id = entity.entity_id.clone();
        {
            let mut registries = self.write();
            match device_id {
                Some(device_id) => registries.parents.insert(id.clone(), device_id),
                None => registries.parents.remove(&id),
            };
            match platform {
                Some(platform) => registries.platforms.insert(id.clone(), platform),
                None => registries.platforms.remove(&id),
            };
        }
        self.replace(id, |_| Some(entity));
    }

    /// Set the raw state, creating a bare entity when it is not known yet
    pub fn set_state(&self, entity_id: &EntityId, state: &str) -> Option<StateChanged> {
        self.replace(entity_id.clone(), |current| {
            let mut entity = current
                .cloned()
                .unwrap_or_else(|| Entity::new(entity_id.clone(), state));
            entity.state = state.to_string();
            Some(entity)
        })
    }

    /// Set one attribute. An unknown entity is created in the `unknown` state.
    pub fn set_attribute(
        &self,
        entity_id: &EntityId,
        key: &str,
        value: Value,
    ) -> Option<StateChanged> {
        self.replace(entity_id.clone(), |current| {
            let mut entity = current
                .cloned()
                .unwrap_or_else(|| Entity::new(entity_id.clone(), STATE_UNKNOWN));
            entity.attributes.insert(key.to_string(), value);
            Some(entity)
        })
    }

    pub fn remove(&self, entity_id: &EntityId) -> Option<StateChanged> {
        {
            let mut registries = self.write();
            registries.parents.remove(entity_id);
            registries.platforms.remove(entity_id);
        }
        self.replace(entity_id.clone(), |_| None)
    }

    /// Apply `update` to the current entity and broadcast the change, if any
    fn replace<F>(&self, entity_id: EntityId, update: F) -> Option<StateChanged>
    where
        F: FnOnce(Option<&Entity>) -> Option<Entity>,
    {
        let change = {
            let mut registries = self.write();
            let old_state = registries.entities.get(&entity_id).cloned();
            let new_state = update(old_state.as_ref());
            if new_state == old_state {
                return None;
            }
            match &new_state {
                Some(entity) => registries.entities.insert(entity_id.clone(), entity.clone()),
                None => registries.entities.remove(&entity_id),
            };
            StateChanged {
                entity_id,
                old_state,
                new_state,
            }
        };

        // No receivers simply means nobody tracks anything yet
        self.events.send(change.clone()).ok();
        Some(change)
    }

    fn read(&self) -> RwLockReadGuard<'_, Registries> {
        self.registries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registries> {
        self.registries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EntityRegistry for InMemoryRuntime {
    fn parent_device(&self, entity_id: &EntityId) -> Option<String> {
        self.read().parents.get(entity_id).cloned()
    }

    fn device_info(&self, device_id: &str) -> Option<DeviceInfo> {
        self.read().devices.get(device_id).cloned()
    }

    fn entities_in(&self, domain: &str) -> Vec<Entity> {
        self.read()
            .entities
            .values()
            .filter(|e| e.domain() == domain)
            .cloned()
            .collect()
    }

    fn entity_platform(&self, entity_id: &EntityId) -> Option<String> {
        self.read().platforms.get(entity_id).cloned()
    }

    fn state_of(&self, entity_id: &EntityId) -> Option<Entity> {
        self.read().entities.get(entity_id).cloned()
    }
}

struct TrackedSubscription {
    token: CancellationToken,
}

impl Subscription for TrackedSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.token.cancel();
    }
}

impl StateBus for InMemoryRuntime {
    fn track(
        &self,
        entity_ids: HashSet<EntityId>,
        listener: Arc<dyn StateListener>,
    ) -> Box<dyn Subscription> {
        let mut rx = self.events.subscribe();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        debug!(entities = entity_ids.len(), "Listener tracking entities");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(change) => {
                            if entity_ids.contains(&change.entity_id) {
                                listener.on_state_changed(change).await;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "State listener fell behind, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        Box::new(TrackedSubscription { token })
    }
}
