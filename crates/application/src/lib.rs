//! Application layer - Use cases and business workflows

pub mod discovery;
pub mod sync;
pub mod telemetry;

pub use discovery::DiscoveryEngine;
pub use sync::{MappingSynchronizer, PassOutcome, SyncState};
pub use telemetry::{PendingBatch, PushSettings, TelemetryPushService};

use domain::BackendError;
use tracing::{error, warn};

/// Log a backend failure at the severity its kind calls for
pub(crate) fn report_backend_error(operation: &str, err: &BackendError) {
    if err.is_auth() {
        error!(operation, error = %err, "Backend rejected credentials, re-authentication required");
    } else if err.is_transient() {
        warn!(operation, error = %err, "Backend unreachable, will retry");
    } else {
        error!(operation, error = %err, "Backend request failed");
    }
}
