use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use flashsale_core::{DomainError, DomainResult, HoldId, ProductId};

/// A time-boxed reservation of product stock.
///
/// At most one of `used_at` / `released_at` is ever set. Once either is set the hold
/// is terminal and neither field changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: HoldId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a hold at a given instant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    Active,
    /// Past expiry but not yet swept.
    Expired,
    Used,
    Released,
}

impl HoldState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HoldState::Used | HoldState::Released)
    }
}

/// Why a hold was released; carried on the `hold_released` metrics event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    Expired,
    Manual,
}

impl ReleaseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseReason::Expired => "expired",
            ReleaseReason::Manual => "manual",
        }
    }
}

impl Hold {
    pub fn new(
        id: HoldId,
        product_id: ProductId,
        quantity: u32,
        now: DateTime<Utc>,
        window: Duration,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(Self {
            id,
            product_id,
            quantity,
            created_at: now,
            expires_at: now + window,
            used_at: None,
            released_at: None,
        })
    }

    /// Expiry is inclusive: at `expires_at` the hold is already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }

    pub fn state(&self, now: DateTime<Utc>) -> HoldState {
        if self.is_used() {
            HoldState::Used
        } else if self.is_released() {
            HoldState::Released
        } else if self.is_expired(now) {
            HoldState::Expired
        } else {
            HoldState::Active
        }
    }

    /// Active and not expired: the hold still reserves stock and may become an order.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == HoldState::Active
    }

    /// Explain why the hold cannot be converted, if it cannot.
    ///
    /// Terminal states win over expiry so a consumed hold always reports
    /// `HoldAlreadyUsed`, however late the second attempt arrives.
    pub fn ensure_valid(&self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.state(now) {
            HoldState::Active => Ok(()),
            HoldState::Used => Err(DomainError::HoldAlreadyUsed),
            HoldState::Released => Err(DomainError::HoldAlreadyReleased),
            HoldState::Expired => Err(DomainError::HoldExpired),
        }
    }

    /// Consume the hold for an order.
    pub fn mark_used(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_valid(now)?;
        self.used_at = Some(now);
        Ok(())
    }

    /// Release the hold, returning the reason, or `None` if it was already terminal.
    pub fn release(&mut self, now: DateTime<Utc>) -> Option<ReleaseReason> {
        if self.is_used() || self.is_released() {
            return None;
        }

        let reason = if self.is_expired(now) {
            ReleaseReason::Expired
        } else {
            ReleaseReason::Manual
        };
        self.released_at = Some(now);
        Some(reason)
    }
}
