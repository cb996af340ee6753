//! Domain layer - Pure business logic with no external dependencies
//!
//! This crate contains:
//! - Value objects (EntityId, Capability, DeviceType)
//! - Runtime entity snapshots and the discovery rules (classifier, grouper)
//! - Entity mappings and typed telemetry readings
//! - Collaborator interfaces (traits) for the runtime, the backend and storage
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Heuristics are deterministic for a fixed runtime topology
//! - Testable in isolation

pub mod backend;
pub mod capability;
pub mod device_type;
pub mod discovery;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod runtime;
pub mod telemetry;

// Re-export commonly used types
pub use backend::{BackendClient, BackendError, DeviceRecord, IngestOutcome, SyncOutcome};
pub use capability::Capability;
pub use device_type::DeviceType;
pub use discovery::{ClassifierRules, DiscoveredDevice, EntityClassifier, DeviceGrouper};
pub use entity::{Entity, EntityId};
pub use error::DomainError;
pub use mapping::{EntityMapping, MappingObserver, MappingSnapshot, MappingStore};
pub use runtime::{DeviceInfo, EntityRegistry, StateBus, StateChanged, StateListener, Subscription};
pub use telemetry::{DeviceEvent, DeviceEventType, EventSource, Reading, ReadingFormatter};
