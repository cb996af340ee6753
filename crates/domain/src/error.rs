use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid entity ID: {0}")]
    InvalidEntityId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
