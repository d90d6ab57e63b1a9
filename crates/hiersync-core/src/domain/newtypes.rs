//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the identifiers used on
//! both sides of a synchronization. Each newtype ensures data validity at
//! construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Tracking-system identifiers
// ============================================================================

/// Opaque identity of an entity in the tracking system
///
/// Stable across runs. Tracking ids are interpolated into query expressions,
/// so only alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingId(String);

impl TrackingId {
    /// Create a new TrackingId
    ///
    /// # Errors
    /// Returns error if the id is empty or contains invalid characters
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidTrackingId(
                "Tracking id cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::InvalidTrackingId(format!(
                "Tracking id contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TrackingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackingId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TrackingId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TrackingId> for String {
    fn from(id: TrackingId) -> Self {
        id.0
    }
}

// ============================================================================
// Asset-database identifiers
// ============================================================================

/// Identity of a document in the asset database
///
/// Uses the 24-character lowercase hexadecimal form of a document-store
/// object id. This is also the value stored in the tracking system's
/// "mongo id" custom attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Length of the hexadecimal representation
    pub const LEN: usize = 24;

    /// Create an AssetId from its hexadecimal form
    ///
    /// Uppercase input is normalized to lowercase.
    ///
    /// # Errors
    /// Returns error if the value is not 24 hexadecimal characters
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if !Self::is_well_formed(&id) {
            return Err(DomainError::InvalidAssetId(format!(
                "Expected {} hexadecimal characters, got: {id}",
                Self::LEN
            )));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Generate a fresh random AssetId
    #[must_use]
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..Self::LEN].to_string())
    }

    /// Returns true if `value` has the shape of an AssetId
    #[must_use]
    pub fn is_well_formed(value: &str) -> bool {
        value.len() == Self::LEN && value.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AssetId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.0
    }
}
