use thiserror::Error;

/// Failure talking to the backend, split by how the caller should react
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Credentials rejected; re-authentication is needed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure or timeout
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Request rejected by the backend
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Likely to succeed when retried later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Server { .. })
    }
}
