//! Stock arithmetic shared by the ledger adapters.

use std::collections::BTreeMap;

use bazaar_catalog::{Product, StockInputs, Variant};
use bazaar_core::{ProductId, VariantId};

use super::StockMovement;

/// Entity whose quantity a movement draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum StockTarget {
    Product(ProductId),
    Variant(ProductId, VariantId),
}

impl StockTarget {
    pub(crate) fn of(movement: &StockMovement) -> Self {
        match movement.variant_id {
            Some(v) => StockTarget::Variant(movement.product_id, v),
            None => StockTarget::Product(movement.product_id),
        }
    }

    pub(crate) fn product_id(self) -> ProductId {
        match self {
            StockTarget::Product(p) | StockTarget::Variant(p, _) => p,
        }
    }

    pub(crate) fn variant_id(self) -> Option<VariantId> {
        match self {
            StockTarget::Product(_) => None,
            StockTarget::Variant(_, v) => Some(v),
        }
    }
}

/// Total requested units per target. Several lines may hit the same target.
pub(crate) fn demand(movements: &[StockMovement]) -> BTreeMap<StockTarget, u32> {
    let mut demand = BTreeMap::new();
    for m in movements {
        let entry = demand.entry(StockTarget::of(m)).or_insert(0u32);
        *entry = entry.saturating_add(m.quantity);
    }
    demand
}

/// Units on hand when `requested` cannot be covered, `None` when it can.
pub(crate) fn shortfall(inputs: StockInputs, requested: u32) -> Option<i64> {
    if !inputs.track_quantity || inputs.allow_backorders {
        return None;
    }
    if inputs.quantity >= i64::from(requested) {
        None
    } else {
        Some(inputs.quantity.max(0))
    }
}

/// Book a sale against the product. The quantity moves only for lines
/// without a variant.
pub(crate) fn sell_product(product: &mut Product, quantity: u32, draws_stock: bool) {
    product.record_sale(quantity);
    if draws_stock && product.track_quantity {
        product.quantity -= i64::from(quantity);
        product.refresh_stock_state();
    }
}

/// Book a sale against a variant. Returns `true` when its status changed.
pub(crate) fn sell_variant(variant: &mut Variant, quantity: u32) -> bool {
    let before = variant.stock;
    variant.record_sale(quantity);
    if variant.track_quantity {
        variant.quantity -= i64::from(quantity);
        variant.refresh_stock_state();
    }
    before != variant.stock
}

pub(crate) fn restore_product(product: &mut Product, quantity: u32, draws_stock: bool) {
    product.reverse_sale(quantity);
    if draws_stock && product.track_quantity {
        product.quantity += i64::from(quantity);
        product.refresh_stock_state();
    }
}

pub(crate) fn restore_variant(variant: &mut Variant, quantity: u32) -> bool {
    let before = variant.stock;
    variant.reverse_sale(quantity);
    if variant.track_quantity {
        variant.quantity += i64::from(quantity);
        variant.refresh_stock_state();
    }
    before != variant.stock
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(quantity: i64, track: bool, backorders: bool) -> StockInputs {
        StockInputs {
            quantity,
            low_stock_threshold: 2,
            allow_backorders: backorders,
            track_quantity: track,
        }
    }

    #[test]
    fn shortfall_only_for_tracked_without_backorders() {
        assert_eq!(shortfall(inputs(3, true, false), 3), None);
        assert_eq!(shortfall(inputs(3, true, false), 4), Some(3));
        assert_eq!(shortfall(inputs(-2, true, false), 1), Some(0));
        assert_eq!(shortfall(inputs(0, true, true), 10), None);
        assert_eq!(shortfall(inputs(0, false, false), 10), None);
    }

    #[test]
    fn demand_sums_lines_hitting_the_same_target() {
        let p = ProductId::new();
        let m = |q| StockMovement { product_id: p, variant_id: None, quantity: q };
        let d = demand(&[m(2), m(3)]);
        assert_eq!(d.get(&StockTarget::Product(p)), Some(&5));
    }

    #[test]
    fn backorder_sale_goes_negative_and_restores_exactly() {
        let mut product = Product::new(ProductId::new(), "p", "P", 100);
        product.allow_backorders = true;
        product.quantity = 1;

        sell_product(&mut product, 3, true);
        assert_eq!(product.quantity, -2);
        assert_eq!(product.total_sold, 3);

        restore_product(&mut product, 3, true);
        assert_eq!(product.quantity, 1);
        assert_eq!(product.total_sold, 0);
    }
}
