//! Errors surfaced by the reservation services.

use thiserror::Error;

use flashsale_core::{DomainError, OrderId};

use crate::lease::LeaseError;
use crate::store::StoreError;

/// Service-level error: a business rejection or an infrastructure failure.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Business-rule rejection (insufficient stock, invalid hold, unknown entity).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The order named by a payment notification never became visible.
    #[error("Order {0} not found after retries")]
    OrderNotFound(OrderId),

    /// Lock timeout, deadlock or an exhausted duplicate-key retry. Safe to retry.
    #[error("contention: {0}")]
    Contention(String),

    #[error("storage failure: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Lease(#[from] LeaseError),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Contention(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        if err.is_retryable() {
            ServiceError::Contention(err.to_string())
        } else {
            ServiceError::Store(err)
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_store_errors_become_contention() {
        let err: ServiceError = StoreError::LockTimeout("product:x".into()).into();
        assert!(err.is_retryable());

        let err: ServiceError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(err, ServiceError::Store(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn domain_errors_keep_their_message() {
        let err: ServiceError = DomainError::InsufficientStock {
            requested: 3,
            available: 1,
        }
        .into();
        assert!(matches!(err, ServiceError::Domain(_)));
        assert!(err.to_string().contains("Insufficient stock"));
    }

    #[test]
    fn order_not_found_mentions_retries() {
        let err = ServiceError::OrderNotFound(OrderId::new());
        assert!(err.to_string().contains("not found after retries"));
    }
}
