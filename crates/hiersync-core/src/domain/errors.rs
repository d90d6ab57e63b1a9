//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including identifier validation failures and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid tracking-system entity identifier
    #[error("Invalid tracking id: {0}")]
    InvalidTrackingId(String),

    /// Invalid asset-database document identifier
    #[error("Invalid asset id: {0}")]
    InvalidAssetId(String),

    /// Unknown tracking entity type name
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidTrackingId("".to_string());
        assert_eq!(err.to_string(), "Invalid tracking id: ");

        let err = DomainError::UnknownEntityType("Planet".to_string());
        assert_eq!(err.to_string(), "Unknown entity type: Planet");

        let err = DomainError::InvalidState {
            from: "done".to_string(),
            to: "running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from done to running"
        );
    }

    #[test]
    fn test_error_equality() {
        let a = DomainError::InvalidAssetId("xyz".to_string());
        let b = DomainError::InvalidAssetId("xyz".to_string());
        let c = DomainError::InvalidAssetId("abc".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
