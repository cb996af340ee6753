//! In-process runtime adapter: registries, states and the state bus.

mod in_memory;
mod snapshot;

pub use in_memory::InMemoryRuntime;
pub use snapshot::{RuntimeSnapshot, SnapshotEntity};
