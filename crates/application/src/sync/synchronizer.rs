use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use domain::{
    BackendClient, BackendError, DiscoveredDevice, DeviceRecord, MappingObserver,
    MappingSnapshot, MappingStore,
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::DiscoveryEngine;
use crate::report_backend_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Stopped,
}

/// Result of one discovery + sync pass
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Synced {
        devices: usize,
        created: u32,
        updated: u32,
        removed: u32,
        mapped_entities: usize,
    },
    /// No discovered device matched the selection; nothing was sent
    NothingSelected,
    /// The backend call failed; the published mapping is unchanged
    Failed(BackendError),
    /// Another pass was already running; its result stands
    Coalesced,
    /// The synchronizer has been stopped
    Stopped,
}

struct Timer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Timer {
    /// True when called from the timer task itself
    fn is_current(&self) -> bool {
        tokio::task::try_id() == Some(self.handle.id())
    }
}

/// Keeps the backend's device list in step with discovery and publishes
/// the resulting entity mapping to observers.
pub struct MappingSynchronizer {
    engine: DiscoveryEngine,
    backend: Arc<dyn BackendClient>,
    store: Option<Arc<dyn MappingStore>>,
    site_id: String,
    selected: RwLock<HashSet<String>>,
    snapshot: RwLock<Arc<MappingSnapshot>>,
    observers: RwLock<Vec<Arc<dyn MappingObserver>>>,
    state: Mutex<SyncState>,
    /// Held for the duration of a pass; concurrent callers coalesce on it
    pass_lock: Mutex<()>,
    period: Mutex<Duration>,
    timer: Mutex<Option<Timer>>,
}

impl MappingSynchronizer {
    pub fn new(
        engine: DiscoveryEngine,
        backend: Arc<dyn BackendClient>,
        site_id: impl Into<String>,
        selected: HashSet<String>,
        period: Duration,
    ) -> Self {
        Self {
            engine,
            backend,
            store: None,
            site_id: site_id.into(),
            selected: RwLock::new(selected),
            snapshot: RwLock::new(Arc::new(MappingSnapshot::default())),
            observers: RwLock::new(Vec::new()),
            state: Mutex::new(SyncState::Idle),
            pass_lock: Mutex::new(()),
            period: Mutex::new(period),
            timer: Mutex::new(None),
        }
    }

    /// Persist every published mapping and seed from it on start
    pub fn with_store(mut self, store: Arc<dyn MappingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Add an observer; registering the same observer again is a no-op
    pub async fn register(&self, observer: Arc<dyn MappingObserver>) {
        let mut observers = self.observers.write().await;
        let key = Arc::as_ptr(&observer) as *const ();
        if observers
            .iter()
            .any(|known| Arc::as_ptr(known) as *const () == key)
        {
            debug!("Mapping observer already registered");
            return;
        }
        observers.push(observer);
    }

    pub async fn state(&self) -> SyncState {
        *self.state.lock().await
    }

    /// Currently published mapping table
    pub async fn snapshot(&self) -> Arc<MappingSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn device_ids(&self) -> BTreeMap<String, String> {
        self.snapshot.read().await.device_ids.clone()
    }

    pub async fn period(&self) -> Duration {
        *self.period.lock().await
    }

    /// Replace the selected device list; used from the next pass on
    pub async fn set_selection(&self, selected: HashSet<String>) {
        info!(count = selected.len(), "Device selection updated");
        *self.selected.write().await = selected;
    }

    /// Seed from the last stored mapping, run one pass, then arm the timer
    pub async fn start(self: &Arc<Self>) -> PassOutcome {
        *self.state.lock().await = SyncState::Idle;
        self.restore().await;

        let outcome = self.sync_now().await;
        if *self.state.lock().await == SyncState::Stopped {
            debug!("Stopped during the first pass, timer not armed");
            return outcome;
        }

        let period = *self.period.lock().await;
        let mut timer = self.timer.lock().await;
        if let Some(old) = timer.take() {
            old.cancel.cancel();
        }
        *timer = Some(self.arm(period));
        info!(interval_secs = period.as_secs(), "Mapping synchronizer started");

        outcome
    }

    /// Cancel the timer and wait for an in-flight pass to finish.
    ///
    /// Safe to call from a mapping observer: observers run after the pass
    /// has released its lock, and the timer task is not joined from inside itself.
    pub async fn stop(&self) {
        *self.state.lock().await = SyncState::Stopped;
        let timer = self.timer.lock().await.take();
        if let Some(timer) = timer {
            timer.cancel.cancel();
            if !timer.is_current() {
                if let Err(e) = timer.handle.await {
                    warn!(error = %e, "Sync timer task ended abnormally");
                }
            }
        }
        let _drain = self.pass_lock.lock().await;
        info!("Mapping synchronizer stopped");
    }

    /// Change the sync period, re-arming the timer if it is running
    pub async fn set_interval(self: &Arc<Self>, period: Duration) {
        {
            let mut current = self.period.lock().await;
            if *current == period {
                return;
            }
            *current = period;
        }

        let mut timer = self.timer.lock().await;
        if let Some(old) = timer.take() {
            old.cancel.cancel();
            *timer = Some(self.arm(period));
            info!(interval_secs = period.as_secs(), "Sync interval changed, timer re-armed");
        }
    }

    /// Run a pass now. A call made while a pass is running waits for that
    /// pass and returns [`PassOutcome::Coalesced`] instead of starting another.
    ///
    /// Observers are notified after the pass lock is released, so they may
    /// call back into the synchronizer.
    pub async fn sync_now(&self) -> PassOutcome {
        if *self.state.lock().await == SyncState::Stopped {
            debug!("Synchronizer stopped, skipping pass");
            return PassOutcome::Stopped;
        }

        let (outcome, published) = {
            let _pass = match self.pass_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!("Sync already in progress, coalescing");
                    let _wait = self.pass_lock.lock().await;
                    return PassOutcome::Coalesced;
                }
            };

            self.transition(SyncState::Idle, SyncState::Syncing).await;
            let result = self.run_pass().await;
            self.transition(SyncState::Syncing, SyncState::Idle).await;
            result
        };

        if let Some(snapshot) = published {
            self.notify(snapshot).await;
        }
        outcome
    }

    async fn transition(&self, from: SyncState, to: SyncState) {
        let mut state = self.state.lock().await;
        if *state == from {
            *state = to;
        }
    }

    fn arm(self: &Arc<Self>, period: Duration) -> Timer {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let this: Weak<Self> = Arc::downgrade(self);
        let period = period.max(Duration::from_secs(1));

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(this) = this.upgrade() else { break };
                        this.sync_now().await;
                    }
                }
            }
            debug!("Sync timer stopped");
        });

        Timer { cancel, handle }
    }

    /// One pass under the pass lock. Returns the snapshot it installed, if any.
    async fn run_pass(&self) -> (PassOutcome, Option<Arc<MappingSnapshot>>) {
        let selected = self.selected.read().await.clone();
        let devices: Vec<DiscoveredDevice> = self
            .engine
            .discover()
            .into_iter()
            .filter(|device| device.matches_selection(&selected))
            .collect();

        if devices.is_empty() {
            info!(
                selected = selected.len(),
                "No selected devices discovered, skipping sync"
            );
            return (PassOutcome::NothingSelected, None);
        }

        let records: Vec<DeviceRecord> = devices.iter().map(DiscoveredDevice::to_record).collect();
        debug!(site_id = %self.site_id, devices = records.len(), "Syncing devices");

        let response = match self.backend.sync_devices(&self.site_id, &records).await {
            Ok(response) => response,
            Err(e) => {
                report_backend_error("Device sync", &e);
                return (PassOutcome::Failed(e), None);
            }
        };

        let (created, updated, removed) = (response.created, response.updated, response.removed);
        let snapshot = MappingSnapshot::build(&devices, response.device_mappings);
        let mapped_entities = snapshot.len();

        info!(
            devices = devices.len(),
            created,
            updated,
            removed,
            mapped_entities,
            "Device sync complete"
        );

        let snapshot = self.install(snapshot, true).await;

        let outcome = PassOutcome::Synced {
            devices: devices.len(),
            created,
            updated,
            removed,
            mapped_entities,
        };
        (outcome, Some(snapshot))
    }

    async fn restore(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if !self.snapshot.read().await.is_empty() {
            return;
        }
        match store.load().await {
            Ok(Some(snapshot)) => {
                info!(entities = snapshot.len(), "Restored last known entity mappings");
                let snapshot = self.install(snapshot, false).await;
                self.notify(snapshot).await;
            }
            Ok(None) => debug!("No stored entity mappings"),
            Err(e) => warn!(error = %e, "Failed to load stored entity mappings"),
        }
    }

    /// Swap in a new mapping table and optionally persist it
    async fn install(&self, snapshot: MappingSnapshot, persist: bool) -> Arc<MappingSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().await = snapshot.clone();

        if persist {
            if let Some(store) = &self.store {
                if let Err(e) = store.save(&snapshot).await {
                    warn!(error = %e, "Failed to persist entity mappings");
                }
            }
        }

        snapshot
    }

    async fn notify(&self, snapshot: Arc<MappingSnapshot>) {
        let observers = self.observers.read().await.clone();
        for observer in observers {
            if let Err(e) = observer.mappings_updated(snapshot.clone()).await {
                error!(error = %e, "Mapping observer failed");
            }
        }
    }
}
