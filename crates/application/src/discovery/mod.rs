mod engine;

pub use engine::DiscoveryEngine;
