//! Grouping runtime entities into devices and classifying them.

mod classifier;
mod device;
mod grouper;
mod rules;

pub use classifier::{EntityClassifier, ExtractedCapabilities};
pub use device::DiscoveredDevice;
pub use grouper::{select_primary, ClusterKind, DeviceGrouper, EntityCluster, Grouping};
pub use rules::{
    ClassifierRules, CONTROL_DOMAINS, FALLBACK_KEYWORDS, METER_DEVICE_CLASSES,
    PLATFORM_DEVICE_TYPES, SIGNAL_KEYWORDS, SIGNAL_THRESHOLD,
};
