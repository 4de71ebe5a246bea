use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, ProductId, VariantId};

/// Maximum quantity of a single line.
pub const MAX_LINE_QUANTITY: u32 = 100;

/// Maximum number of distinct lines in a cart.
pub const MAX_LINES: usize = 50;

/// Identity of a cart line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
}

impl LineKey {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

impl core::fmt::Display for LineKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.variant_id {
            Some(v) => write!(f, "{}/{}", self.product_id, v),
            None => core::fmt::Display::fmt(&self.product_id, f),
        }
    }
}

/// One line of a cart. This is also the guest cookie wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(key: LineKey, quantity: u32, added_at: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id,
            variant_id: key.variant_id,
            quantity,
            added_at,
        }
    }

    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id, self.variant_id)
    }
}

/// Check a requested quantity against `[min, MAX_LINE_QUANTITY]`.
///
/// `min` is 1 for adds and 0 for updates (0 removes the line).
pub fn validate_quantity(quantity: i64, min: u32) -> DomainResult<u32> {
    if quantity < i64::from(min) || quantity > i64::from(MAX_LINE_QUANTITY) {
        return Err(DomainError::validation(format!(
            "quantity must be between {min} and {MAX_LINE_QUANTITY}"
        )));
    }
    // In range, so the cast is lossless.
    Ok(quantity as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_bounds() {
        assert_eq!(validate_quantity(1, 1), Ok(1));
        assert_eq!(validate_quantity(100, 1), Ok(100));
        assert!(validate_quantity(0, 1).is_err());
        assert!(validate_quantity(101, 1).is_err());
        assert!(validate_quantity(-3, 0).is_err());
        assert_eq!(validate_quantity(0, 0), Ok(0));
    }

    #[test]
    fn wire_shape_is_camel_case_and_omits_missing_variant() {
        let line = CartLine::new(
            LineKey::new(ProductId::new(), None),
            2,
            Utc::now(),
        );
        let json = serde_json::to_value(&line).unwrap();
        assert!(json.get("productId").is_some());
        assert!(json.get("addedAt").is_some());
        assert!(json.get("variantId").is_none());
        assert_eq!(json["quantity"], 2);
    }
}
