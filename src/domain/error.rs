//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure. These represent business
//! rule violations and domain invariant failures, independent of the storage or
//! transport layer.

use thiserror::Error;

/// Domain-specific errors for the User aggregate and its commands.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A required field failed a pre-check before business rules ran.
    #[error("validation failed for field: {field}")]
    Validation { field: String },

    /// A business rule in `Aggregate::handle` rejected the command.
    #[error("business rule violated: {rule}")]
    BusinessRuleViolation { rule: String },

    /// The targeted aggregate does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// A uniqueness constraint was violated (e.g. duplicate username/email).
    #[error("conflict on field: {field}")]
    Conflict { field: String },

    /// Optimistic-concurrency conflict surfaced after retries are exhausted.
    #[error("concurrency conflict: expected revision {expected}, found {found}")]
    ConcurrencyConflict { expected: i64, found: i64 },
}

impl DomainError {
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation { field: field.into() }
    }

    pub fn business_rule(rule: impl Into<String>) -> Self {
        Self::BusinessRuleViolation { rule: rule.into() }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn conflict(field: impl Into<String>) -> Self {
        Self::Conflict { field: field.into() }
    }

    /// Whether this is a client error (the caller's fault, not retryable as-is).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::BusinessRuleViolation { .. } | Self::Conflict { .. }
        )
    }

    /// Whether a bounded retry of the whole load-decide-append sequence may help.
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rule_violation() {
        let err = DomainError::business_rule("password_unchanged");
        assert!(err.is_client_error());
        assert!(!err.is_conflict_error());
        assert!(err.to_string().contains("password_unchanged"));
    }

    #[test]
    fn test_concurrency_conflict() {
        let err = DomainError::ConcurrencyConflict {
            expected: 1,
            found: 2,
        };
        assert!(!err.is_client_error());
        assert!(err.is_conflict_error());
    }

    #[test]
    fn test_not_found_display() {
        let err = DomainError::not_found("User", "abc-123");
        assert!(err.to_string().contains("User"));
        assert!(err.to_string().contains("abc-123"));
    }
}
