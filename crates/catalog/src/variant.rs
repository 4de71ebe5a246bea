use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, Entity, ProductId, VariantId};

use crate::stock::{SellableStatus, StockInputs, StockState, StockStatus, derive_stock_state};

/// A purchasable option of a product (size, colour, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    /// Globally unique; enforced by the catalog store.
    pub sku: String,
    pub options: BTreeMap<String, String>,
    pub quantity: i64,
    pub track_quantity: bool,
    pub allow_backorders: bool,
    pub low_stock_threshold: i64,
    pub stock: StockState,
    pub is_default: bool,
    /// Overrides the product price when set.
    pub price: Option<u64>,
    pub total_sold: u64,
    pub version: u64,
}

impl Variant {
    pub fn new(id: VariantId, product_id: ProductId, sku: impl Into<String>) -> Self {
        Self {
            id,
            product_id,
            sku: sku.into(),
            options: BTreeMap::new(),
            quantity: 0,
            track_quantity: true,
            allow_backorders: false,
            low_stock_threshold: 5,
            stock: StockState::Auto(SellableStatus::OutOfStock),
            is_default: false,
            price: None,
            total_sold: 0,
            version: 0,
        }
    }

    pub fn stock_status(&self) -> StockStatus {
        self.stock.status()
    }

    pub fn is_available(&self) -> bool {
        self.stock.is_available()
    }

    pub fn stock_inputs(&self) -> StockInputs {
        StockInputs {
            quantity: self.quantity,
            low_stock_threshold: self.low_stock_threshold,
            allow_backorders: self.allow_backorders,
            track_quantity: self.track_quantity,
        }
    }

    pub fn refresh_stock_state(&mut self) {
        self.stock = derive_stock_state(self.stock_inputs(), self.stock);
    }

    pub fn set_manual_status(&mut self, status: StockStatus) {
        self.stock = StockState::manual(status);
        self.refresh_stock_state();
    }

    pub fn record_sale(&mut self, quantity: u32) {
        self.total_sold = self.total_sold.saturating_add(u64::from(quantity));
    }

    pub fn reverse_sale(&mut self, quantity: u32) {
        self.total_sold = self.total_sold.saturating_sub(u64::from(quantity));
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
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

impl Entity for Variant {
    type Id = VariantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
