//! Interfaces onto the live home-automation runtime.

mod bus;
mod registry;

pub use bus::{StateBus, StateChanged, StateListener, Subscription};
pub use registry::{DeviceInfo, EntityRegistry, SUPPORTED_DOMAINS};

#[cfg(test)]
pub use registry::MockEntityRegistry;
