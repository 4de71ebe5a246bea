//! Product administration and the shopper-facing product page.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use bazaar_catalog::{
    Product, StockStatus, Unavailable, Variant, all_variants_unavailable, purchasable,
    select_default_variant,
};
use bazaar_core::{ExpectedVersion, ProductId, VariantId};

use super::Ports;
use crate::error::{CommerceError, StoreError};
use crate::store::AnalyticsSignal;

/// Create/update payload. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub published: Option<bool>,
    pub quantity: Option<i64>,
    pub track_quantity: Option<bool>,
    pub allow_backorders: Option<bool>,
    pub low_stock_threshold: Option<i64>,
    /// Explicit operator status: the only way to set or clear `discontinued`.
    pub stock_status: Option<StockStatus>,
    pub price: Option<u64>,
    #[serde(default, deserialize_with = "super::double_option::deserialize")]
    pub sale_price: Option<Option<u64>>,
    /// Optimistic concurrency guard for updates.
    pub expected_version: Option<u64>,
}

impl ProductInput {
    fn apply(self, product: &mut Product) {
        if let Some(slug) = self.slug {
            product.slug = slug.trim().to_string();
        }
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(published) = self.published {
            product.published = published;
        }
        if let Some(quantity) = self.quantity {
            product.quantity = quantity;
        }
        if let Some(track) = self.track_quantity {
            product.track_quantity = track;
        }
        if let Some(backorders) = self.allow_backorders {
            product.allow_backorders = backorders;
        }
        if let Some(threshold) = self.low_stock_threshold {
            product.low_stock_threshold = threshold;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(sale_price) = self.sale_price {
            product.sale_price = sale_price;
        }
        match self.stock_status {
            Some(status) => product.set_manual_status(status),
            None => product.refresh_stock_state(),
        }
    }
}

/// Product detail as shown to shoppers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub product: Product,
    pub variants: Vec<Variant>,
    pub default_variant_id: Option<VariantId>,
    pub purchasable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    ports: Ports,
}

impl CatalogService {
    pub fn new(ports: Ports) -> Self {
        Self { ports }
    }

    #[instrument(skip(self, input), err)]
    pub async fn create_product(&self, input: ProductInput) -> Result<Product, CommerceError> {
        let slug = input.slug.clone().unwrap_or_default();
        let name = input.name.clone().unwrap_or_default();
        let price = input
            .price
            .ok_or_else(|| CommerceError::validation("price is required"))?;

        let mut product = Product::new(ProductId::new(), slug, name, price);
        input.apply(&mut product);
        product.validate()?;

        let saved = self
            .ports
            .catalog
            .save_product(&product, ExpectedVersion::Exact(0))
            .await
            .map_err(slug_conflict)?;
        info!(product_id = %saved.id, slug = %saved.slug, "product created");
        Ok(saved)
    }

    #[instrument(skip(self, input), err)]
    pub async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Product, CommerceError> {
        let current = self
            .ports
            .catalog
            .product(id)
            .await?
            .ok_or_else(|| CommerceError::not_found("product"))?;
        let expected = ExpectedVersion::Exact(input.expected_version.unwrap_or(current.version));

        let mut product = current;
        input.apply(&mut product);
        product.validate()?;

        let saved = self
            .ports
            .catalog
            .save_product(&product, expected)
            .await
            .map_err(slug_conflict)?;
        info!(product_id = %saved.id, status = %saved.stock_status(), "product updated");
        Ok(saved)
    }

    /// Published product by slug with its variants and purchasability.
    /// Counts a view; a failure to count never fails the page.
    pub async fn product_page(&self, slug: &str) -> Result<ProductPage, CommerceError> {
        let product = self
            .ports
            .catalog
            .product_by_slug(slug)
            .await?
            .filter(|p| p.published)
            .ok_or_else(|| CommerceError::not_found("product"))?;
        let variants = self.ports.catalog.variants_of(product.id).await?;

        let default_variant = if product.has_variants {
            select_default_variant(&variants).ok()
        } else {
            None
        };
        let unavailable = purchasable(&product, None)
            .and_then(|()| {
                if product.has_variants && all_variants_unavailable(&variants) {
                    Err(Unavailable::all_variants())
                } else {
                    purchasable(&product, default_variant)
                }
            })
            .err();

        if let Err(err) = self
            .ports
            .catalog
            .record_signal(product.id, AnalyticsSignal::View, Utc::now())
            .await
        {
            warn!(product_id = %product.id, error = %err, "failed to record product view");
        }

        Ok(ProductPage {
            default_variant_id: default_variant.map(|v| v.id),
            purchasable: unavailable.is_none(),
            unavailable_reason: unavailable.map(|u| u.message().to_string()),
            product,
            variants,
        })
    }
}

fn slug_conflict(err: StoreError) -> CommerceError {
    match err {
        StoreError::Duplicate("slug") => CommerceError::Conflict("slug already exists".to_string()),
        StoreError::Conflict(_) => {
            CommerceError::Conflict("product was modified concurrently".to_string())
        }
        other => other.into(),
    }
}
