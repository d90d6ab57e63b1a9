//! Error types for the reconciliation stage

use thiserror::Error;

/// Errors that abort reconciliation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// The tracking tree is structurally broken (dangling parent or cycle)
    #[error("hierarchy integrity violated: {0}")]
    HierarchyIntegrity(String),

    /// A configured naming pattern does not compile
    #[error("invalid naming pattern {field}: {reason}")]
    InvalidPattern { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConflictError::HierarchyIntegrity("cycle at SH010".to_string());
        assert_eq!(err.to_string(), "hierarchy integrity violated: cycle at SH010");

        let err = ConflictError::InvalidPattern {
            field: "naming.task_pattern".to_string(),
            reason: "unclosed class".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid naming pattern naming.task_pattern: unclosed class"
        );
    }
}
