//! Application services.
//!
//! Each service composes the storage ports with the pure domain rules. They
//! hold `Arc<dyn Port>` handles and are cheap to clone into request handlers.

pub mod admin_catalog;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod reversal;
pub mod variants;

pub use admin_catalog::{CatalogService, ProductInput, ProductPage};
pub use cart::{CartItemView, CartService, CartView};
pub use checkout::{CheckoutService, LineSource, PlaceOrder, Placement, RequestedLine, Shopper};
pub use orders::{OrderService, OrderUpdate};
pub use reversal::{OrderReversal, ReversalReport};
pub use variants::{VariantInput, VariantMaintenance};

use std::sync::Arc;

use bazaar_catalog::{Product, Variant};
use bazaar_core::{ProductId, VariantId};

use crate::error::CommerceError;
use crate::store::{
    CartRepository, CatalogStore, InMemoryCommerceStore, InventoryLedger, OrderRepository,
    UserDirectory,
};

/// The storage ports a deployment wires into the services.
#[derive(Clone)]
pub struct Ports {
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn InventoryLedger>,
    pub orders: Arc<dyn OrderRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub users: Arc<dyn UserDirectory>,
}

impl Ports {
    /// Every port backed by the same in-memory store.
    pub fn in_memory(store: Arc<InMemoryCommerceStore>) -> Self {
        Self {
            catalog: store.clone(),
            ledger: store.clone(),
            orders: store.clone(),
            carts: store.clone(),
            users: store,
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates. Use with `#[serde(default)]`.
pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Load a product visible to shoppers (exists and is published).
pub(crate) async fn shopper_product(
    catalog: &dyn CatalogStore,
    id: ProductId,
) -> Result<Product, CommerceError> {
    catalog
        .product(id)
        .await?
        .filter(|p| p.published)
        .ok_or_else(|| CommerceError::not_found("product"))
}

/// Load a variant and check it belongs to `product`.
pub(crate) async fn variant_of(
    catalog: &dyn CatalogStore,
    product: &Product,
    id: VariantId,
) -> Result<Variant, CommerceError> {
    catalog
        .variant(id)
        .await?
        .filter(|v| v.product_id == product.id)
        .ok_or_else(|| CommerceError::not_found("variant"))
}

/// Product and (resolved) variant a line will buy.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub product: Product,
    pub variant: Option<Variant>,
}

impl Resolved {
    pub fn stock_cap(&self) -> bazaar_catalog::StockCap {
        bazaar_catalog::stock_cap(&self.product, self.variant.as_ref())
    }

    /// Variant price override, else sale price, else list price.
    pub fn unit_price(&self) -> u64 {
        self.variant
            .as_ref()
            .and_then(|v| v.price)
            .unwrap_or_else(|| self.product.unit_price())
    }
}

/// Load a line's product/variant fresh and run the hierarchical
/// availability check.
///
/// With `pick_default`, a multi-variant product without `variant_id` gets its
/// default variant; otherwise the line is checked exactly as keyed.
pub(crate) async fn resolve_purchase(
    catalog: &dyn CatalogStore,
    product_id: ProductId,
    variant_id: Option<VariantId>,
    pick_default: bool,
) -> Result<Resolved, CommerceError> {
    use bazaar_catalog::{
        Unavailable, all_variants_unavailable, purchasable, select_default_variant,
    };

    let product = shopper_product(catalog, product_id).await?;
    purchasable(&product, None)?;

    let variant = if product.has_variants {
        let variants = catalog.variants_of(product.id).await?;
        if all_variants_unavailable(&variants) {
            return Err(Unavailable::all_variants().into());
        }
        match variant_id {
            Some(id) => Some(
                variants
                    .into_iter()
                    .find(|v| v.id == id)
                    .ok_or_else(|| CommerceError::not_found("variant"))?,
            ),
            None if pick_default => Some(
                select_default_variant(&variants)
                    .map_err(|_| Unavailable::all_variants())?
                    .clone(),
            ),
            None => None,
        }
    } else {
        match variant_id {
            Some(id) => Some(variant_of(catalog, &product, id).await?),
            None => None,
        }
    };

    purchasable(&product, variant.as_ref())?;
    Ok(Resolved { product, variant })
}
