//! Validated `domain.object_id` entity identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for invalid entity ids
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity id '{0}' must have the form domain.object_id")]
    MissingSeparator(String),

    #[error("entity id '{0}' has an empty domain or object id")]
    EmptySegment(String),

    #[error("entity id '{0}' contains invalid characters (lowercase alphanumeric and interior underscores only)")]
    InvalidChars(String),
}

/// An entity identifier such as `sensor.hallway_temperature`.
///
/// Stored as the full dotted string. Both segments must be non-empty,
/// lowercase alphanumeric, with underscores allowed only in the interior.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Build an entity id from its two segments.
    pub fn new(domain: &str, object_id: &str) -> Result<Self, EntityIdError> {
        format!("{domain}.{object_id}").parse()
    }

    /// The domain segment (e.g. `sensor`).
    pub fn domain(&self) -> &str {
        // Validated at construction, the separator is always present.
        self.0.split_once('.').map(|(d, _)| d).unwrap_or(&self.0)
    }

    /// The object id segment (e.g. `hallway_temperature`).
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map(|(_, o)| o).unwrap_or(&self.0)
    }

    /// The full dotted identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn valid_segment(s: &str) -> bool {
        !s.is_empty()
            && !s.starts_with('_')
            && !s.ends_with('_')
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, object_id) = s
            .split_once('.')
            .ok_or_else(|| EntityIdError::MissingSeparator(s.to_string()))?;
        if object_id.contains('.') {
            return Err(EntityIdError::MissingSeparator(s.to_string()));
        }
        if domain.is_empty() || object_id.is_empty() {
            return Err(EntityIdError::EmptySegment(s.to_string()));
        }
        if !Self::valid_segment(domain) || !Self::valid_segment(object_id) {
            return Err(EntityIdError::InvalidChars(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
