//! Availability resolver.
//!
//! A product's own unavailability (discontinued / out of stock) blocks every
//! variant, whatever the variant's status says. Cart add, cart update and
//! order placement all go through [`purchasable`] so they agree.

use serde::Serialize;
use thiserror::Error;

use crate::product::Product;
use crate::stock::StockStatus;
use crate::variant::Variant;

/// Level at which a purchase was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableScope {
    Product,
    Variant,
    AllVariants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Permanent: the operator withdrew it.
    Discontinued,
    /// Temporary: may come back in stock.
    OutOfStock,
}

/// Why something cannot be bought right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct Unavailable {
    pub scope: UnavailableScope,
    pub reason: UnavailableReason,
}

impl Unavailable {
    pub fn product(reason: UnavailableReason) -> Self {
        Self {
            scope: UnavailableScope::Product,
            reason,
        }
    }

    pub fn variant(reason: UnavailableReason) -> Self {
        Self {
            scope: UnavailableScope::Variant,
            reason,
        }
    }

    pub fn all_variants() -> Self {
        Self {
            scope: UnavailableScope::AllVariants,
            reason: UnavailableReason::OutOfStock,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.reason == UnavailableReason::Discontinued
    }

    /// Shopper-facing message.
    pub fn message(&self) -> &'static str {
        match (self.scope, self.reason) {
            (UnavailableScope::Product, UnavailableReason::Discontinued) => {
                "This product has been discontinued and is no longer available"
            }
            (UnavailableScope::Product, UnavailableReason::OutOfStock) => {
                "This product is temporarily out of stock"
            }
            (UnavailableScope::Variant, UnavailableReason::Discontinued) => {
                "The selected option has been discontinued and is no longer available"
            }
            (UnavailableScope::Variant, UnavailableReason::OutOfStock) => {
                "The selected option is temporarily out of stock"
            }
            (UnavailableScope::AllVariants, _) => {
                "All options of this product are currently unavailable"
            }
        }
    }
}

fn blocking_reason(status: StockStatus) -> Option<UnavailableReason> {
    match status {
        StockStatus::Discontinued => Some(UnavailableReason::Discontinued),
        StockStatus::OutOfStock => Some(UnavailableReason::OutOfStock),
        _ => None,
    }
}

/// Hierarchical purchasability check: product first, then the variant.
pub fn purchasable(product: &Product, variant: Option<&Variant>) -> Result<(), Unavailable> {
    if let Some(reason) = blocking_reason(product.stock_status()) {
        return Err(Unavailable::product(reason));
    }
    if let Some(variant) = variant {
        if let Some(reason) = blocking_reason(variant.stock_status()) {
            return Err(Unavailable::variant(reason));
        }
    }
    Ok(())
}

/// `true` when the product has variants and none of them can be sold.
pub fn all_variants_unavailable(variants: &[Variant]) -> bool {
    !variants.is_empty() && variants.iter().all(|v| !v.is_available())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("product has no variants to choose from")]
pub struct NoAvailableVariant;

/// First variant with the highest non-zero `total_sold` among `candidates`.
fn best_seller<'a>(candidates: impl Iterator<Item = &'a Variant>) -> Option<&'a Variant> {
    candidates
        .filter(|v| v.total_sold > 0)
        .fold(None, |best: Option<&Variant>, v| match best {
            Some(b) if b.total_sold >= v.total_sold => Some(b),
            _ => Some(v),
        })
}

/// Pick the variant used when a multi-variant product is added without one.
///
/// Priority: available default, available best seller, default (even if
/// unavailable), best seller (even if unavailable), first available, first.
pub fn select_default_variant(variants: &[Variant]) -> Result<&Variant, NoAvailableVariant> {
    let default = variants.iter().find(|v| v.is_default);

    if let Some(v) = default.filter(|v| v.is_available()) {
        return Ok(v);
    }
    if let Some(v) = best_seller(variants.iter().filter(|v| v.is_available())) {
        return Ok(v);
    }
    if let Some(v) = default {
        return Ok(v);
    }
    if let Some(v) = best_seller(variants.iter()) {
        return Ok(v);
    }
    if let Some(v) = variants.iter().find(|v| v.is_available()) {
        return Ok(v);
    }
    variants.first().ok_or(NoAvailableVariant)
}

/// Upper bound on how many units of a line may be held or sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockCap {
    /// Untracked, or backorders allowed.
    Unlimited,
    Limited(i64),
}

impl StockCap {
    pub fn allows(self, quantity: u32) -> bool {
        match self {
            StockCap::Unlimited => true,
            StockCap::Limited(available) => i64::from(quantity) <= available,
        }
    }

    /// Units on hand, if limited (never negative).
    pub fn available(self) -> Option<i64> {
        match self {
            StockCap::Unlimited => None,
            StockCap::Limited(available) => Some(available),
        }
    }
}

/// Stock limit for a line: the variant's own stock when a variant is chosen,
/// otherwise the product's.
pub fn stock_cap(product: &Product, variant: Option<&Variant>) -> StockCap {
    let (tracked, backorders, quantity) = match variant {
        Some(v) => (v.track_quantity, v.allow_backorders, v.quantity),
        None => (product.track_quantity, product.allow_backorders, product.quantity),
    };
    if !tracked || backorders {
        StockCap::Unlimited
    } else {
        StockCap::Limited(quantity.max(0))
    }
}
