//! Cart Store.
//!
//! The service works on [`Cart`] values: the HTTP boundary decides whether a
//! cart comes from the user's saved cart or from the guest cookie, and writes
//! it back afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use bazaar_cart::{Cart, CartLine, LineKey, MergeOutcome, MergeWarning, combine, validate_quantity};
use bazaar_catalog::{StockCap, StockStatus, purchasable, stock_cap};
use bazaar_core::{ProductId, UserId, VariantId};

use super::{resolve_purchase, shopper_product, variant_of};
use crate::error::CommerceError;
use crate::store::{AnalyticsSignal, CartRepository, CatalogStore};

/// One cart line joined with live catalog data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    pub unit_price: u64,
    pub line_total: u64,
    pub stock_status: StockStatus,
    pub is_in_stock: bool,
    /// `None` when stock is not limited.
    pub available_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    pub subtotal: u64,
    pub is_empty: bool,
}

#[derive(Clone)]
pub struct CartService {
    catalog: Arc<dyn CatalogStore>,
    carts: Arc<dyn CartRepository>,
}

impl CartService {
    pub fn new(catalog: Arc<dyn CatalogStore>, carts: Arc<dyn CartRepository>) -> Self {
        Self { catalog, carts }
    }

    pub async fn load(&self, user_id: UserId) -> Result<Cart, CommerceError> {
        Ok(self.carts.load(user_id).await?)
    }

    pub async fn save(&self, user_id: UserId, cart: &Cart) -> Result<(), CommerceError> {
        if cart.is_empty() {
            self.carts.clear(user_id).await?;
        } else {
            self.carts.save(user_id, cart).await?;
        }
        Ok(())
    }

    /// Add `quantity` units, resolving the default variant when needed.
    ///
    /// Returns the key of the line that received the units.
    #[instrument(skip(self, cart), err)]
    pub async fn add(
        &self,
        cart: &mut Cart,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: i64,
    ) -> Result<LineKey, CommerceError> {
        let quantity = validate_quantity(quantity, 1)?;
        let resolved = resolve_purchase(self.catalog.as_ref(), product_id, variant_id, true).await?;
        let key = LineKey::new(product_id, resolved.variant.as_ref().map(|v| v.id));

        let merged = cart.preview_add(key, quantity)?;
        if let StockCap::Limited(available) = resolved.stock_cap() {
            if i64::from(merged) > available {
                return Err(CommerceError::insufficient_stock(available, cart.quantity_of(key)));
            }
        }
        cart.add(key, quantity, Utc::now())?;

        if let Err(err) = self
            .catalog
            .record_signal(product_id, AnalyticsSignal::CartAdd, Utc::now())
            .await
        {
            warn!(product_id = %product_id, error = %err, "failed to record cart-add analytics");
        }
        Ok(key)
    }

    /// Set a line's quantity; `0` removes it, anything else is re-validated
    /// against current stock.
    #[instrument(skip(self, cart), err)]
    pub async fn update(
        &self,
        cart: &mut Cart,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: i64,
    ) -> Result<(), CommerceError> {
        let quantity = validate_quantity(quantity, 0)?;
        let key = LineKey::new(product_id, variant_id);
        let current = cart
            .get(key)
            .map(|l| l.quantity)
            .ok_or_else(|| CommerceError::not_found("cart item"))?;

        if quantity > 0 {
            let resolved =
                resolve_purchase(self.catalog.as_ref(), product_id, variant_id, false).await?;
            if let StockCap::Limited(available) = resolved.stock_cap() {
                if i64::from(quantity) > available {
                    return Err(CommerceError::insufficient_stock(available, current));
                }
            }
        }
        cart.set_quantity(key, quantity)?;
        Ok(())
    }

    pub fn remove(&self, cart: &mut Cart, key: LineKey) -> Result<CartLine, CommerceError> {
        cart.remove(key)
            .map_err(|_| CommerceError::not_found("cart item"))
    }

    /// Merge a guest cart into the user's cart and re-validate the result
    /// against live stock. Problems are reported as warnings, never errors.
    #[instrument(skip_all, fields(guest_lines = guest.len()), err)]
    pub async fn merge(
        &self,
        user_cart: &Cart,
        guest: &[CartLine],
    ) -> Result<MergeOutcome, CommerceError> {
        let MergeOutcome { mut cart, mut warnings } = combine(user_cart, guest);

        for line in cart.lines().to_vec() {
            let key = line.key();
            let product = match shopper_product(self.catalog.as_ref(), line.product_id).await {
                Ok(p) => p,
                Err(CommerceError::NotFound(_)) => {
                    cart.retain(|l| l.key() != key);
                    warnings.push(MergeWarning::ProductMissing { key });
                    continue;
                }
                Err(e) => return Err(e),
            };
            let variant = match line.variant_id {
                Some(id) => match variant_of(self.catalog.as_ref(), &product, id).await {
                    Ok(v) => Some(v),
                    Err(CommerceError::NotFound(_)) => {
                        cart.retain(|l| l.key() != key);
                        warnings.push(MergeWarning::ProductMissing { key });
                        continue;
                    }
                    Err(e) => return Err(e),
                },
                None => None,
            };

            if let Err(unavailable) = purchasable(&product, variant.as_ref()) {
                cart.retain(|l| l.key() != key);
                warnings.push(MergeWarning::Unavailable {
                    key,
                    message: unavailable.message().to_string(),
                });
                continue;
            }

            if let StockCap::Limited(available) = stock_cap(&product, variant.as_ref()) {
                if available <= 0 {
                    cart.retain(|l| l.key() != key);
                    warnings.push(MergeWarning::OutOfStock { key });
                } else if let Some(requested) =
                    cart.clamp(key, u32::try_from(available).unwrap_or(u32::MAX))
                {
                    warnings.push(MergeWarning::StockClamped {
                        key,
                        requested,
                        kept: cart.quantity_of(key),
                    });
                }
            }
        }

        for w in &warnings {
            warn!(line = %w.key(), warning = %w, "cart merge adjusted a line");
        }
        Ok(MergeOutcome { cart, warnings })
    }

    /// Cart joined with live product/variant data. Lines whose product or
    /// variant disappeared are left out.
    pub async fn view(&self, cart: &Cart) -> Result<CartView, CommerceError> {
        let mut items = Vec::with_capacity(cart.len());

        for line in cart.lines() {
            let product = match shopper_product(self.catalog.as_ref(), line.product_id).await {
                Ok(p) => p,
                Err(CommerceError::NotFound(_)) => {
                    debug!(product_id = %line.product_id, "cart line product no longer listed");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let variant = match line.variant_id {
                Some(id) => match variant_of(self.catalog.as_ref(), &product, id).await {
                    Ok(v) => Some(v),
                    Err(CommerceError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                },
                None => None,
            };

            let unavailable = purchasable(&product, variant.as_ref()).err();
            let cap = stock_cap(&product, variant.as_ref());
            let unit_price = variant
                .as_ref()
                .and_then(|v| v.price)
                .unwrap_or_else(|| product.unit_price());

            items.push(CartItemView {
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
                added_at: line.added_at,
                name: product.name.clone(),
                slug: product.slug.clone(),
                sku: variant.as_ref().map(|v| v.sku.clone()),
                options: variant.as_ref().map(|v| v.options.clone()).unwrap_or_default(),
                unit_price,
                line_total: unit_price.saturating_mul(u64::from(line.quantity)),
                stock_status: variant
                    .as_ref()
                    .map(|v| v.stock_status())
                    .unwrap_or_else(|| product.stock_status()),
                is_in_stock: unavailable.is_none() && cap.allows(line.quantity),
                available_quantity: cap.available(),
                unavailable_reason: unavailable.map(|u| u.message().to_string()),
            });
        }

        let item_count = items.iter().map(|i| i.quantity).sum();
        let subtotal = items.iter().map(|i| i.line_total).sum();
        Ok(CartView {
            is_empty: items.is_empty(),
            items,
            item_count,
            subtotal,
        })
    }
}
