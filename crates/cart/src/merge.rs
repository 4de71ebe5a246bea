//! Guest → user cart merge.
//!
//! [`combine`] performs the pure part of the merge (sum quantities per key,
//! enforce line and cart limits). Re-validating the combined lines against
//! live stock happens in the cart service, which appends its own
//! [`MergeWarning`]s to the outcome.

use crate::cart::Cart;
use crate::line::{CartLine, LineKey, MAX_LINE_QUANTITY, MAX_LINES};

/// Non-fatal adjustment made while merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeWarning {
    /// Summed quantity exceeded the per-line limit.
    QuantityCapped { key: LineKey, requested: u32, kept: u32 },
    /// Cart already held the maximum number of lines.
    CartFull { key: LineKey },
    /// Product or variant no longer exists or is not published.
    ProductMissing { key: LineKey },
    /// Product or variant exists but cannot be bought right now.
    Unavailable { key: LineKey, message: String },
    /// Not enough stock: quantity lowered to what is on hand.
    StockClamped { key: LineKey, requested: u32, kept: u32 },
    /// Nothing on hand: line dropped.
    OutOfStock { key: LineKey },
}

impl MergeWarning {
    pub fn key(&self) -> LineKey {
        match self {
            MergeWarning::QuantityCapped { key, .. }
            | MergeWarning::CartFull { key }
            | MergeWarning::ProductMissing { key }
            | MergeWarning::Unavailable { key, .. }
            | MergeWarning::StockClamped { key, .. }
            | MergeWarning::OutOfStock { key } => *key,
        }
    }
}

impl core::fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MergeWarning::QuantityCapped { requested, kept, .. } => {
                write!(f, "quantity reduced from {requested} to {kept} (maximum per item)")
            }
            MergeWarning::CartFull { .. } => {
                write!(f, "item not added: cart holds at most {MAX_LINES} items")
            }
            MergeWarning::ProductMissing { .. } => {
                write!(f, "item removed: product is no longer available")
            }
            MergeWarning::Unavailable { message, .. } => write!(f, "item removed: {message}"),
            MergeWarning::StockClamped { requested, kept, .. } => {
                write!(f, "quantity reduced from {requested} to {kept} (limited stock)")
            }
            MergeWarning::OutOfStock { .. } => write!(f, "item removed: out of stock"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub cart: Cart,
    pub warnings: Vec<MergeWarning>,
}

/// Fold guest lines into a copy of the user's cart.
///
/// Matching keys are summed and capped at [`MAX_LINE_QUANTITY`]; new keys are
/// appended until the cart holds [`MAX_LINES`] lines, the rest are skipped.
/// User lines keep their position and `added_at`.
pub fn combine(user: &Cart, guest: &[CartLine]) -> MergeOutcome {
    let mut cart = user.clone();
    let mut warnings = Vec::new();

    for line in guest.iter().filter(|l| l.quantity > 0) {
        let key = line.key();
        if let Some(existing) = cart.line_mut(key) {
            let requested = existing.quantity.saturating_add(line.quantity);
            existing.quantity = requested.min(MAX_LINE_QUANTITY);
            if requested > MAX_LINE_QUANTITY {
                warnings.push(MergeWarning::QuantityCapped {
                    key,
                    requested,
                    kept: MAX_LINE_QUANTITY,
                });
            }
            continue;
        }

        if cart.len() >= MAX_LINES {
            warnings.push(MergeWarning::CartFull { key });
            continue;
        }

        let kept = line.quantity.min(MAX_LINE_QUANTITY);
        if kept < line.quantity {
            warnings.push(MergeWarning::QuantityCapped {
                key,
                requested: line.quantity,
                kept,
            });
        }
        cart.push_unchecked(CartLine {
            quantity: kept,
            ..line.clone()
        });
    }

    MergeOutcome { cart, warnings }
}
