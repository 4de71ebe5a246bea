//! Variant default & rollup rules.
//!
//! These functions only compute the new state; persisting it (and retrying
//! on version conflicts) is the caller's job.

use bazaar_core::VariantId;

use crate::availability::all_variants_unavailable;
use crate::product::Product;
use crate::stock::{SellableStatus, StockState};
use crate::variant::Variant;

/// Variants that must lose their default flag when `written` is saved with
/// `is_default = true`.
pub fn defaults_to_clear(siblings: &[Variant], written: VariantId) -> Vec<VariantId> {
    siblings
        .iter()
        .filter(|v| v.id != written && v.is_default)
        .map(|v| v.id)
        .collect()
}

/// Roll variant quantity and availability up to the parent product.
///
/// `variants` is the full, already-updated variant list of `product`.
/// Quantity is always rolled up; status only when `status_changed` (a
/// variant's stock status moved on update). A discontinued product is never
/// touched. Returns `true` when the product was modified.
pub fn apply_rollup(product: &mut Product, variants: &[Variant], status_changed: bool) -> bool {
    let before = (product.quantity, product.stock, product.has_variants);

    product.has_variants = !variants.is_empty();
    if product.has_variants {
        product.quantity = variants
            .iter()
            .filter(|v| v.track_quantity)
            .map(|v| v.quantity.max(0))
            .sum();
    }

    if status_changed && product.stock != StockState::Discontinued {
        let auto_out = StockState::Auto(SellableStatus::OutOfStock);
        if all_variants_unavailable(variants) {
            product.stock = auto_out;
        } else if product.stock == auto_out {
            product.stock = StockState::Auto(SellableStatus::InStock);
        }
    }

    before != (product.quantity, product.stock, product.has_variants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::StockStatus;
    use bazaar_core::ProductId;

    fn parent() -> Product {
        let mut p = Product::new(ProductId::new(), "jacket", "Jacket", 9_900);
        p.has_variants = true;
        p.stock = StockState::Auto(SellableStatus::InStock);
        p
    }

    fn variant(p: &Product, quantity: i64) -> Variant {
        let mut v = Variant::new(VariantId::new(), p.id, format!("JKT-{quantity}"));
        v.quantity = quantity;
        v.refresh_stock_state();
        v
    }

    #[test]
    fn only_other_defaults_are_cleared() {
        let p = parent();
        let mut a = variant(&p, 1);
        let mut b = variant(&p, 2);
        let c = variant(&p, 3);
        a.is_default = true;
        b.is_default = true;

        let cleared = defaults_to_clear(&[a.clone(), b.clone(), c], b.id);
        assert_eq!(cleared, vec![a.id]);
    }

    #[test]
    fn quantity_is_sum_of_tracked_variants() {
        let mut p = parent();
        let a = variant(&p, 4);
        let mut b = variant(&p, 100);
        b.track_quantity = false;
        let c = variant(&p, 6);

        assert!(apply_rollup(&mut p, &[a, b, c], false));
        assert_eq!(p.quantity, 10);
    }

    #[test]
    fn all_unavailable_sets_product_out_of_stock() {
        let mut p = parent();
        let vs = vec![variant(&p, 0), variant(&p, 0)];

        apply_rollup(&mut p, &vs, true);
        assert_eq!(p.stock_status(), StockStatus::OutOfStock);
    }

    #[test]
    fn restock_reverts_auto_out_of_stock() {
        let mut p = parent();
        p.stock = StockState::Auto(SellableStatus::OutOfStock);
        let vs = vec![variant(&p, 0), variant(&p, 8)];

        apply_rollup(&mut p, &vs, true);
        assert_eq!(p.stock_status(), StockStatus::InStock);
    }

    #[test]
    fn discontinued_product_is_never_touched() {
        let mut p = parent();
        p.stock = StockState::Discontinued;

        let vs = [variant(&p, 20)];
        apply_rollup(&mut p, &vs, true);
        assert_eq!(p.stock, StockState::Discontinued);

        let vs = [variant(&p, 0)];
        apply_rollup(&mut p, &vs, true);
        assert_eq!(p.stock, StockState::Discontinued);
    }

    #[test]
    fn status_untouched_without_status_change() {
        let mut p = parent();
        let vs = vec![variant(&p, 0)];
        apply_rollup(&mut p, &vs, false);
        assert_eq!(p.stock_status(), StockStatus::InStock);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

            /// Replaying any sequence of "save variant i as default" writes,
            /// clearing siblings each time, leaves at most one default.
            #[test]
            fn at_most_one_default(
                writes in prop::collection::vec((0usize..6, any::<bool>()), 0..40),
            ) {
                let p = parent();
                let mut variants: Vec<Variant> = (0..6).map(|i| variant(&p, i)).collect();

                for (index, make_default) in writes {
                    let id = variants[index].id;
                    variants[index].is_default = make_default;
                    if make_default {
                        let cleared = defaults_to_clear(&variants, id);
                        for v in variants.iter_mut().filter(|v| cleared.contains(&v.id)) {
                            v.is_default = false;
                        }
                    }
                    prop_assert!(variants.iter().filter(|v| v.is_default).count() <= 1);
                }
            }
        }
    }
}
