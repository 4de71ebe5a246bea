//! Variant Default & Rollup Maintenance.
//!
//! Every variant write runs the stock calculator, then rolls quantity (and,
//! when the variant's status moved, availability) up to the parent product.
//! The single-default rule is enforced by `CatalogStore::save_variant` in the
//! same write that stores the new default. Parent writes use optimistic
//! versions and retry on conflict.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, instrument};

use bazaar_catalog::{StockStatus, Variant, apply_rollup};
use bazaar_core::{ExpectedVersion, ProductId, VariantId};

use super::Ports;
use crate::error::{CommerceError, StoreError};

const MAX_RETRIES: usize = 5;

/// Create/update payload. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantInput {
    pub sku: Option<String>,
    pub options: Option<BTreeMap<String, String>>,
    pub quantity: Option<i64>,
    pub track_quantity: Option<bool>,
    pub allow_backorders: Option<bool>,
    pub low_stock_threshold: Option<i64>,
    /// Explicit operator status: the only way to set or clear `discontinued`.
    pub stock_status: Option<StockStatus>,
    pub is_default: Option<bool>,
    /// `null` removes the price override.
    #[serde(default, deserialize_with = "super::double_option::deserialize")]
    pub price: Option<Option<u64>>,
}

impl VariantInput {
    fn apply(self, variant: &mut Variant) {
        if let Some(sku) = self.sku {
            variant.sku = sku.trim().to_string();
        }
        if let Some(options) = self.options {
            variant.options = options;
        }
        if let Some(quantity) = self.quantity {
            variant.quantity = quantity;
        }
        if let Some(track) = self.track_quantity {
            variant.track_quantity = track;
        }
        if let Some(backorders) = self.allow_backorders {
            variant.allow_backorders = backorders;
        }
        if let Some(threshold) = self.low_stock_threshold {
            variant.low_stock_threshold = threshold;
        }
        if let Some(is_default) = self.is_default {
            variant.is_default = is_default;
        }
        if let Some(price) = self.price {
            variant.price = price;
        }
        match self.stock_status {
            Some(status) => variant.set_manual_status(status),
            None => variant.refresh_stock_state(),
        }
    }
}

#[derive(Clone)]
pub struct VariantMaintenance {
    ports: Ports,
}

impl VariantMaintenance {
    pub fn new(ports: Ports) -> Self {
        Self { ports }
    }

    #[instrument(skip(self, input), err)]
    pub async fn create(
        &self,
        product_id: ProductId,
        input: VariantInput,
    ) -> Result<Variant, CommerceError> {
        if self.ports.catalog.product(product_id).await?.is_none() {
            return Err(CommerceError::not_found("product"));
        }
        let sku = input
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CommerceError::validation("sku is required"))?
            .to_string();

        let mut variant = Variant::new(VariantId::new(), product_id, sku);
        input.apply(&mut variant);
        variant.validate()?;

        let saved = self
            .ports
            .catalog
            .save_variant(&variant, ExpectedVersion::Exact(0))
            .await
            .map_err(sku_conflict)?;
        // A new variant brings a status the parent has not seen yet.
        self.roll_up(saved.product_id, true).await?;
        info!(variant_id = %saved.id, sku = %saved.sku, "variant created");
        Ok(saved)
    }

    #[instrument(skip(self, input), err)]
    pub async fn update(
        &self,
        variant_id: VariantId,
        input: VariantInput,
    ) -> Result<Variant, CommerceError> {
        let current = self
            .ports
            .catalog
            .variant(variant_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("variant"))?;

        let mut variant = current.clone();
        input.apply(&mut variant);
        variant.validate()?;

        let saved = self
            .ports
            .catalog
            .save_variant(&variant, ExpectedVersion::Exact(current.version))
            .await
            .map_err(sku_conflict)?;
        let status_changed = current.stock_status() != saved.stock_status();
        self.roll_up(saved.product_id, status_changed).await?;
        info!(variant_id = %saved.id, status = %saved.stock_status(), "variant updated");
        Ok(saved)
    }

    async fn roll_up(
        &self,
        product_id: ProductId,
        status_changed: bool,
    ) -> Result<(), CommerceError> {
        for _ in 0..MAX_RETRIES {
            let product = self
                .ports
                .catalog
                .product(product_id)
                .await?
                .ok_or_else(|| CommerceError::not_found("product"))?;
            let variants = self.ports.catalog.variants_of(product_id).await?;

            let mut rolled = product.clone();
            if !apply_rollup(&mut rolled, &variants, status_changed) {
                return Ok(());
            }
            match self
                .ports
                .catalog
                .save_product(&rolled, ExpectedVersion::Exact(product.version))
                .await
            {
                Ok(saved) => {
                    debug!(
                        product_id = %product_id,
                        quantity = saved.quantity,
                        status = %saved.stock_status(),
                        "rolled variants up to product"
                    );
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(CommerceError::Conflict("product was modified concurrently".to_string()))
    }
}

fn sku_conflict(err: StoreError) -> CommerceError {
    match err {
        StoreError::Duplicate("sku") => CommerceError::Conflict("sku already exists".to_string()),
        StoreError::Conflict(_) => {
            CommerceError::Conflict("variant was modified concurrently".to_string())
        }
        StoreError::NotFound => CommerceError::not_found("product"),
        other => other.into(),
    }
}
