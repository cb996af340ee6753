use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Value object representing a runtime entity identifier
///
/// Rules:
/// - Must have the form `<domain>.<object_id>`
/// - Both parts non-empty, lowercase alphanumeric or underscore
/// - Max length 255 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Create a new EntityId with validation
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(DomainError::InvalidEntityId(
                "Entity ID cannot be empty".to_string(),
            ));
        }

        if id.len() > 255 {
            return Err(DomainError::InvalidEntityId(format!(
                "Entity ID too long: {} chars (max 255)",
                id.len()
            )));
        }

        let Some((domain, object_id)) = id.split_once('.') else {
            return Err(DomainError::InvalidEntityId(format!(
                "Entity ID {id} must have the form <domain>.<object_id>"
            )));
        };

        let valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        };

        if !valid_part(domain) || !valid_part(object_id) {
            return Err(DomainError::InvalidEntityId(format!(
                "Entity ID {id} must contain only lowercase alphanumerics and underscores"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the dot, e.g. `sensor`
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map(|(d, _)| d).unwrap_or(&self.0)
    }

    /// The part after the dot, e.g. `han_power`
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map(|(_, o)| o).unwrap_or("")
    }
}

impl TryFrom<String> for EntityId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
