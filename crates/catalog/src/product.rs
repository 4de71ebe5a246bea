use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, Entity, ProductId};

use crate::analytics::ProductAnalytics;
use crate::stock::{SellableStatus, StockInputs, StockState, StockStatus, derive_stock_state};

/// Catalog product as seen by the cart and order engines.
///
/// Prices are in the smallest currency unit (e.g. cents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    /// Unpublished products behave as missing for shoppers.
    pub published: bool,
    pub quantity: i64,
    pub track_quantity: bool,
    pub allow_backorders: bool,
    pub low_stock_threshold: i64,
    pub stock: StockState,
    pub has_variants: bool,
    pub total_sold: u64,
    pub price: u64,
    pub sale_price: Option<u64>,
    pub analytics: ProductAnalytics,
    pub version: u64,
}

impl Product {
    /// A published, tracked product with no stock yet.
    pub fn new(
        id: ProductId,
        slug: impl Into<String>,
        name: impl Into<String>,
        price: u64,
    ) -> Self {
        Self {
            id,
            slug: slug.into(),
            name: name.into(),
            published: true,
            quantity: 0,
            track_quantity: true,
            allow_backorders: false,
            low_stock_threshold: 5,
            stock: StockState::Auto(SellableStatus::OutOfStock),
            has_variants: false,
            total_sold: 0,
            price,
            sale_price: None,
            analytics: ProductAnalytics::default(),
            version: 0,
        }
    }

    pub fn stock_status(&self) -> StockStatus {
        self.stock.status()
    }

    pub fn stock_inputs(&self) -> StockInputs {
        StockInputs {
            quantity: self.quantity,
            low_stock_threshold: self.low_stock_threshold,
            allow_backorders: self.allow_backorders,
            track_quantity: self.track_quantity,
        }
    }

    /// Re-run the stock status calculator.
    ///
    /// Products with variants get their status from the variant rollup
    /// instead (see [`crate::maintenance::apply_rollup`]).
    pub fn refresh_stock_state(&mut self) {
        if self.has_variants {
            return;
        }
        self.stock = derive_stock_state(self.stock_inputs(), self.stock);
    }

    /// Explicit operator status edit, followed by the calculator.
    pub fn set_manual_status(&mut self, status: StockStatus) {
        self.stock = StockState::manual(status);
        self.refresh_stock_state();
    }

    /// Sale price when one is set (and non-zero), list price otherwise.
    pub fn unit_price(&self) -> u64 {
        self.sale_price.filter(|p| *p > 0).unwrap_or(self.price)
    }

    pub fn record_sale(&mut self, quantity: u32) {
        self.total_sold = self.total_sold.saturating_add(u64::from(quantity));
        self.analytics.refresh(self.total_sold);
    }

    pub fn reverse_sale(&mut self, quantity: u32) {
        self.total_sold = self.total_sold.saturating_sub(u64::from(quantity));
        self.analytics.refresh(self.total_sold);
    }

    /// Validate operator-supplied fields before persistence.
    pub fn validate(&self) -> DomainResult<()> {
        if self.slug.trim().is_empty() {
            return Err(DomainError::validation("slug cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.low_stock_threshold < 0 {
            return Err(DomainError::validation("lowStockThreshold cannot be negative"));
        }
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product::new(ProductId::new(), "tee", "Tee", 2_000)
    }

    #[test]
    fn refresh_derives_from_quantity() {
        let mut p = product();
        p.quantity = 5;
        p.low_stock_threshold = 5;
        p.refresh_stock_state();
        assert_eq!(p.stock_status(), StockStatus::LowStock);
    }

    #[test]
    fn products_with_variants_are_not_recomputed_here() {
        let mut p = product();
        p.has_variants = true;
        p.quantity = 100;
        p.refresh_stock_state();
        assert_eq!(p.stock_status(), StockStatus::OutOfStock);
    }

    #[test]
    fn discontinued_survives_restock() {
        let mut p = product();
        p.set_manual_status(StockStatus::Discontinued);
        p.quantity = 40;
        p.refresh_stock_state();
        assert_eq!(p.stock_status(), StockStatus::Discontinued);
    }

    #[test]
    fn unit_price_prefers_sale_price() {
        let mut p = product();
        assert_eq!(p.unit_price(), 2_000);
        p.sale_price = Some(1_500);
        assert_eq!(p.unit_price(), 1_500);
        p.sale_price = Some(0);
        assert_eq!(p.unit_price(), 2_000);
    }

    #[test]
    fn reverse_sale_floors_at_zero() {
        let mut p = product();
        p.record_sale(2);
        p.reverse_sale(5);
        assert_eq!(p.total_sold, 0);
    }

    #[test]
    fn validate_rejects_blank_slug() {
        let mut p = product();
        p.slug = "  ".to_string();
        assert!(matches!(p.validate(), Err(DomainError::Validation(_))));
    }
}
