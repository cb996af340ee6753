mod synchronizer;

pub use synchronizer::{MappingSynchronizer, PassOutcome, SyncState};
