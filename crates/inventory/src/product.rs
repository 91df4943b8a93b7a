use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flashsale_core::{DomainError, DomainResult, ProductId};

/// A sellable product and its committed stock.
///
/// `stock` is the canonical count of units not yet sold. Holds and pending orders do
/// not touch it; only a successful payment decrements it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in the smallest currency unit (e.g. cents).
    pub price: u64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        price: u64,
        stock: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }

        Ok(Self {
            id,
            name,
            price,
            stock,
            created_at: now,
            updated_at: now,
        })
    }

    /// Total price for `quantity` units.
    pub fn price_for(&self, quantity: u32) -> DomainResult<u64> {
        self.price
            .checked_mul(u64::from(quantity))
            .ok_or_else(|| DomainError::validation("total price overflows"))
    }

    /// Remove sold units from the committed stock.
    pub fn record_sale(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        let remaining = self.stock - i64::from(quantity);
        if remaining < 0 {
            return Err(DomainError::validation("stock cannot go negative"));
        }
        self.stock = remaining;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i64) -> Product {
        Product::new(ProductId::new(), "Flash Sale Item", 9999, stock, Utc::now()).unwrap()
    }

    #[test]
    fn new_rejects_blank_name_and_negative_stock() {
        let now = Utc::now();
        assert!(Product::new(ProductId::new(), "  ", 100, 1, now).is_err());
        assert!(Product::new(ProductId::new(), "Item", 100, -1, now).is_err());
    }

    #[test]
    fn price_for_multiplies_unit_price() {
        assert_eq!(product(10).price_for(3).unwrap(), 29_997);
    }

    #[test]
    fn price_for_reports_overflow() {
        let mut p = product(1);
        p.price = u64::MAX;
        assert!(p.price_for(2).is_err());
    }

    #[test]
    fn record_sale_never_drives_stock_negative() {
        let mut p = product(2);
        p.record_sale(2, Utc::now()).unwrap();
        assert_eq!(p.stock, 0);
        assert!(p.record_sale(1, Utc::now()).is_err());
        assert_eq!(p.stock, 0);
    }
}
