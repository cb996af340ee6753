use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    BackendClient, BackendError, Capability, DeviceEvent, EntityMapping, EntityRegistry,
    MappingObserver, MappingSnapshot, Reading, ReadingFormatter, StateBus, StateChanged,
    StateListener, Subscription,
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::PendingBatch;
use crate::report_backend_error;

/// Flush policy of the push pipeline
#[derive(Debug, Clone)]
pub struct PushSettings {
    pub site_id: String,
    /// Quiet period after a change before pending readings are flushed
    pub debounce: Duration,
    /// Period of the forced re-push of every mapped entity
    pub heartbeat: Duration,
    /// Pending device count that triggers an immediate flush
    pub max_batch_size: usize,
}

/// Streams entity state changes to the backend as batched readings
pub struct TelemetryPushService {
    inner: Arc<PushInner>,
}

struct PushInner {
    settings: PushSettings,
    backend: Arc<dyn BackendClient>,
    registry: Arc<dyn EntityRegistry>,
    bus: Arc<dyn StateBus>,
    mappings: RwLock<Arc<MappingSnapshot>>,
    pending: Mutex<PendingBatch>,
    /// Serializes flushes so a failed batch is requeued before the next drain
    flush_lock: Mutex<()>,
    /// Last on/off state seen per remote device
    previous_is_on: Mutex<HashMap<String, bool>>,
    running: AtomicBool,
    shutdown: Mutex<CancellationToken>,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    debounce_armed: AtomicBool,
}

/// Bus listener feeding state changes back into the service
struct StateForwarder {
    inner: Weak<PushInner>,
}

#[async_trait]
impl StateListener for StateForwarder {
    async fn on_state_changed(&self, change: StateChanged) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_state_change(change).await;
        }
    }
}

impl TelemetryPushService {
    pub fn new(
        settings: PushSettings,
        backend: Arc<dyn BackendClient>,
        registry: Arc<dyn EntityRegistry>,
        bus: Arc<dyn StateBus>,
    ) -> Self {
        Self {
            inner: Arc::new(PushInner {
                settings,
                backend,
                registry,
                bus,
                mappings: RwLock::new(Arc::new(MappingSnapshot::default())),
                pending: Mutex::new(PendingBatch::new()),
                flush_lock: Mutex::new(()),
                previous_is_on: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                shutdown: Mutex::new(CancellationToken::new()),
                subscription: Mutex::new(None),
                heartbeat: Mutex::new(None),
                debounce: Mutex::new(None),
                debounce_armed: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of devices with readings waiting for a flush
    pub async fn pending_devices(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Pending reading for one remote device
    pub async fn pending_reading(&self, device_id: &str) -> Option<Reading> {
        self.inner.pending.lock().await.get(device_id).cloned()
    }

    /// Subscribe to mapped entities, push an initial snapshot and start the heartbeat
    pub async fn start(&self) {
        let inner = &self.inner;
        if inner.running.swap(true, Ordering::SeqCst) {
            warn!("Telemetry push service already running");
            return;
        }

        let token = CancellationToken::new();
        *inner.shutdown.lock().await = token.clone();
        inner.debounce_armed.store(false, Ordering::SeqCst);

        inner.resubscribe().await;

        if let Err(e) = inner.push_now().await {
            debug!(error = %e, "Initial telemetry snapshot not delivered, will retry");
        }

        *inner.heartbeat.lock().await = Some(inner.spawn_heartbeat(token));
        info!(
            debounce_secs = inner.settings.debounce.as_secs(),
            heartbeat_secs = inner.settings.heartbeat.as_secs(),
            max_batch_size = inner.settings.max_batch_size,
            "Telemetry push service started"
        );
    }

    /// Unsubscribe, stop the timers and flush what is still pending
    pub async fn stop(&self) {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        inner.shutdown.lock().await.cancel();
        if let Some(subscription) = inner.subscription.lock().await.take() {
            subscription.unsubscribe();
        }

        let heartbeat = inner.heartbeat.lock().await.take();
        let debounce = inner.debounce.lock().await.take();
        for task in [heartbeat, debounce].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!(error = %e, "Telemetry timer task ended abnormally");
            }
        }
        inner.debounce_armed.store(false, Ordering::SeqCst);

        if let Err(e) = inner.flush().await {
            let pending = inner.pending.lock().await.len();
            warn!(error = %e, pending, "Final telemetry flush failed");
        }
        info!("Telemetry push service stopped");
    }

    /// Re-read every mapped entity and push the result
    pub async fn push_now(&self) -> Result<usize, BackendError> {
        self.inner.push_now().await
    }

    /// Push everything pending. Returns the number of readings sent.
    pub async fn flush(&self) -> Result<usize, BackendError> {
        self.inner.flush().await
    }

    /// Feed one state change through the pipeline
    pub async fn handle_state_change(&self, change: StateChanged) {
        self.inner.handle_state_change(change).await;
    }
}

#[async_trait]
impl MappingObserver for TelemetryPushService {
    async fn mappings_updated(
        &self,
        snapshot: Arc<MappingSnapshot>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.inner.apply_mappings(snapshot).await;
        Ok(())
    }
}

impl PushInner {
    async fn handle_state_change(self: &Arc<Self>, change: StateChanged) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let Some(entity) = change.new_state else {
            return;
        };

        let snapshot = self.mappings.read().await.clone();
        let Some(mapping) = snapshot.get(change.entity_id.as_str()) else {
            debug!(entity_id = %change.entity_id, "Ignoring state change for unmapped entity");
            return;
        };
        if !entity.is_available() {
            debug!(entity_id = %change.entity_id, state = %entity.state, "Ignoring unavailable state");
            return;
        }

        let associated = self.associated_is_on(&snapshot, mapping);
        let Some(reading) = ReadingFormatter::format(&entity, mapping, associated) else {
            debug!(entity_id = %change.entity_id, "State carries no measurement");
            return;
        };

        if let Some(is_on) = reading.is_on {
            self.track_on_off(&mapping.remote_device_id, is_on, reading.power_w)
                .await;
        }

        let pending_devices = {
            let mut pending = self.pending.lock().await;
            pending.merge(reading);
            pending.len()
        };

        if pending_devices >= self.settings.max_batch_size {
            debug!(pending_devices, "Batch size reached, flushing immediately");
            self.spawn_flush();
        } else {
            self.schedule_debounce().await;
        }
    }

    /// Flush in the background so the bus listener never waits on the backend
    fn spawn_flush(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.flush().await {
                debug!(error = %e, "Immediate flush failed, readings requeued");
            }
        });
    }

    /// Record the device's on/off state and report a flip as a device event
    async fn track_on_off(&self, device_id: &str, is_on: bool, power_w: Option<f64>) {
        let was_on = self
            .previous_is_on
            .lock()
            .await
            .insert(device_id.to_string(), is_on);
        let Some(event) = was_on
            .and_then(|was_on| DeviceEvent::transition(device_id, was_on, is_on, power_w, Utc::now()))
        else {
            return;
        };

        info!(device_id, event_type = ?event.event_type, "Device switched");
        let backend = self.backend.clone();
        let site_id = self.settings.site_id.clone();
        tokio::spawn(async move {
            match backend.report_events(&site_id, std::slice::from_ref(&event)).await {
                Ok(outcome) if outcome.ingested > 0 => {
                    debug!(device_id = %event.device_id, "Device event reported")
                }
                Ok(_) => warn!(device_id = %event.device_id, "Device event not ingested"),
                Err(e) => warn!(device_id = %event.device_id, error = %e, "Failed to report device event"),
            }
        });
    }

    /// On/off state of the device's switch entity, for sensor readings
    fn associated_is_on(&self, snapshot: &MappingSnapshot, mapping: &EntityMapping) -> Option<bool> {
        if mapping.capability == Capability::OnOff {
            return None;
        }
        let switch_id = snapshot.entity_for(&mapping.remote_device_id, Capability::OnOff)?;
        let switch = self.registry.state_of(switch_id)?;
        ReadingFormatter::on_off_state(&switch)
    }

    async fn schedule_debounce(self: &Arc<Self>) {
        if self.debounce_armed.swap(true, Ordering::SeqCst) {
            return;
        }

        let token = self.shutdown.lock().await.child_token();
        let delay = self.settings.debounce;
        let this = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(delay) => {
                    let Some(this) = this.upgrade() else { return };
                    this.debounce_armed.store(false, Ordering::SeqCst);
                    if let Err(e) = this.flush().await {
                        debug!(error = %e, "Debounced flush failed, readings requeued");
                    }
                }
            }
        });
        *self.debounce.lock().await = Some(handle);
    }

    fn spawn_heartbeat(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let period = self.settings.heartbeat.max(Duration::from_secs(1));
        let this = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(this) = this.upgrade() else { break };
                        debug!("Heartbeat push");
                        if let Err(e) = this.push_now().await {
                            debug!(error = %e, "Heartbeat push failed");
                        }
                    }
                }
            }
        })
    }

    async fn push_now(&self) -> Result<usize, BackendError> {
        let snapshot = self.mappings.read().await.clone();
        let mut readings = Vec::new();
        for (entity_id, mapping) in &snapshot.entities {
            let Some(entity) = self.registry.state_of(entity_id) else {
                continue;
            };
            let associated = self.associated_is_on(&snapshot, mapping);
            if let Some(reading) = ReadingFormatter::format(&entity, mapping, associated) {
                readings.push(reading);
            }
        }

        {
            let mut pending = self.pending.lock().await;
            for reading in readings {
                pending.merge(reading);
            }
        }
        self.flush().await
    }

    async fn flush(&self) -> Result<usize, BackendError> {
        let _serial = self.flush_lock.lock().await;

        let readings = self.pending.lock().await.drain();
        if readings.is_empty() {
            return Ok(0);
        }
        let count = readings.len();

        match self
            .backend
            .push_telemetry(&self.settings.site_id, Utc::now(), &readings)
            .await
        {
            Ok(outcome) => {
                debug!(readings = count, ingested = outcome.ingested, "Telemetry batch pushed");
                Ok(count)
            }
            Err(e) => {
                report_backend_error("Telemetry push", &e);
                let active = self.active_remote_ids().await;
                let requeued = self.pending.lock().await.requeue(readings, &active);
                warn!(requeued, dropped = count - requeued, "Telemetry batch requeued");
                Err(e)
            }
        }
    }

    async fn active_remote_ids(&self) -> HashSet<String> {
        self.mappings
            .read()
            .await
            .remote_ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    async fn apply_mappings(self: &Arc<Self>, snapshot: Arc<MappingSnapshot>) {
        let previous = {
            let mut mappings = self.mappings.write().await;
            std::mem::replace(&mut *mappings, snapshot.clone())
        };

        let active = self.active_remote_ids().await;
        let dropped = self.pending.lock().await.retain_devices(&active);
        if dropped > 0 {
            debug!(dropped, "Dropped pending readings for unmapped devices");
        }
        self.previous_is_on
            .lock()
            .await
            .retain(|device_id, _| active.contains(device_id));

        if self.running.load(Ordering::SeqCst) && previous.entity_ids() != snapshot.entity_ids() {
            info!(entities = snapshot.len(), "Entity mappings changed, resubscribing");
            self.resubscribe().await;
        }
    }

    async fn resubscribe(self: &Arc<Self>) {
        let entity_ids = self.mappings.read().await.entity_ids();
        let mut subscription = self.subscription.lock().await;
        if let Some(old) = subscription.take() {
            old.unsubscribe();
        }
        if entity_ids.is_empty() {
            debug!("No mapped entities to track");
            return;
        }

        debug!(entities = entity_ids.len(), "Tracking mapped entities");
        let listener: Arc<dyn StateListener> = Arc::new(StateForwarder {
            inner: Arc::downgrade(self),
        });
        *subscription = Some(self.bus.track(entity_ids, listener));
    }
}
