//! Wiring of the bridge: discovery, mapping sync and telemetry push over one runtime.

pub mod bridge;

pub use bridge::Bridge;
