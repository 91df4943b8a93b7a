//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// These are the expected business-rule rejections of the reservation flow. They are
/// surfaced to the caller as-is and are never retried automatically. Infrastructure
/// concerns (storage, cache, locking) belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. a non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The product cannot cover the requested quantity.
    #[error("Insufficient stock available (requested: {requested}, available: {available})")]
    InsufficientStock { requested: u32, available: i64 },

    /// The hold passed its expiry before it was converted.
    #[error("Hold is expired")]
    HoldExpired,

    /// The hold already produced an order.
    #[error("Hold is already used")]
    HoldAlreadyUsed,

    /// The hold was released (manually or by the expiry sweep).
    #[error("Hold is released")]
    HoldAlreadyReleased,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound(entity)
    }

    /// Stable machine-readable code, used by transports.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::HoldExpired => "hold_expired",
            DomainError::HoldAlreadyUsed => "hold_already_used",
            DomainError::HoldAlreadyReleased => "hold_already_released",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_is_caller_readable() {
        let err = DomainError::InsufficientStock {
            requested: 3,
            available: 1,
        };
        assert!(err.to_string().contains("Insufficient stock"));
        assert_eq!(err.code(), "insufficient_stock");
    }

    #[test]
    fn hold_state_errors_are_distinguished() {
        assert_eq!(DomainError::HoldExpired.to_string(), "Hold is expired");
        assert_eq!(DomainError::HoldAlreadyUsed.to_string(), "Hold is already used");
        assert_eq!(DomainError::HoldAlreadyReleased.to_string(), "Hold is released");
        assert_eq!(DomainError::not_found("hold").to_string(), "hold not found");
    }
}
