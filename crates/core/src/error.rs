//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failure raised by the pure catalog, cart and order
/// rules. Storage and transport failures are modelled by the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("{0}")]
    Validation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The named thing (`"cart item"`, `"variant"`) does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Stale version or duplicate unique value.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A lifecycle state machine refused to move.
    #[error("cannot move {machine} from {from} to {to}")]
    InvalidTransition {
        machine: &'static str,
        from: &'static str,
        to: &'static str,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: &'static str) -> Self {
        Self::NotFound(what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_shopper_readable() {
        assert_eq!(DomainError::not_found("cart item").to_string(), "cart item not found");
        assert_eq!(
            DomainError::InvalidTransition {
                machine: "order",
                from: "cancelled",
                to: "shipped"
            }
            .to_string(),
            "cannot move order from cancelled to shipped"
        );
    }
}
