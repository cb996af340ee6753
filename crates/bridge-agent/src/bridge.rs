use std::collections::HashSet;
use std::sync::Arc;

use application::{
    DiscoveryEngine, MappingSynchronizer, PassOutcome, PushSettings, TelemetryPushService,
};
use domain::{BackendClient, EntityRegistry, MappingStore, StateBus};
use infrastructure::BridgeConfig;
use tracing::info;

/// The running pipeline: a synchronizer publishing mappings to the push service
pub struct Bridge {
    pub synchronizer: Arc<MappingSynchronizer>,
    pub telemetry: Arc<TelemetryPushService>,
}

impl Bridge {
    pub fn new<R>(
        config: &BridgeConfig,
        runtime: Arc<R>,
        backend: Arc<dyn BackendClient>,
        store: Option<Arc<dyn MappingStore>>,
    ) -> Self
    where
        R: EntityRegistry + StateBus + 'static,
    {
        let selected: HashSet<String> = config.selected_devices.iter().cloned().collect();
        let engine = DiscoveryEngine::new(runtime.clone(), config.classifier.clone());

        let mut synchronizer = MappingSynchronizer::new(
            engine,
            backend.clone(),
            config.site_id.clone(),
            selected,
            config.sync_interval(),
        );
        if let Some(store) = store {
            synchronizer = synchronizer.with_store(store);
        }

        let telemetry = TelemetryPushService::new(
            PushSettings {
                site_id: config.site_id.clone(),
                debounce: config.push_interval(),
                heartbeat: config.heartbeat_interval(),
                max_batch_size: config.max_batch_size,
            },
            backend,
            runtime.clone(),
            runtime,
        );

        Self {
            synchronizer: Arc::new(synchronizer),
            telemetry: Arc::new(telemetry),
        }
    }

    /// First sync pass, then telemetry on whatever mapping is published.
    /// Restarting after [`Bridge::stop`] keeps a single registration.
    pub async fn start(&self) -> PassOutcome {
        self.synchronizer.register(self.telemetry.clone()).await;
        let outcome = self.synchronizer.start().await;
        info!(?outcome, "Initial device sync finished");
        self.telemetry.start().await;
        outcome
    }

    /// Telemetry first so its final flush still sees the current mapping
    pub async fn stop(&self) {
        self.telemetry.stop().await;
        self.synchronizer.stop().await;
    }
}
