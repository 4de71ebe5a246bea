//! Stock status model and the stock status calculator.
//!
//! `discontinued` is an operator decision layered over an otherwise computed
//! status, so it is modelled as its own variant of [`StockState`] rather than
//! as one more value of a flat enum. The calculator can only ever produce
//! [`StockState::Auto`]; leaving `Discontinued` requires
//! [`StockState::manual`].

use serde::{Deserialize, Serialize};

/// Wire/storage representation of a stock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    OnBackorder,
    Discontinued,
}

impl StockStatus {
    /// `true` unless the status blocks purchase (out of stock or discontinued).
    pub fn is_available(self) -> bool {
        !matches!(self, StockStatus::OutOfStock | StockStatus::Discontinued)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::OnBackorder => "on_backorder",
            StockStatus::Discontinued => "discontinued",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_stock" => Some(StockStatus::InStock),
            "low_stock" => Some(StockStatus::LowStock),
            "out_of_stock" => Some(StockStatus::OutOfStock),
            "on_backorder" => Some(StockStatus::OnBackorder),
            "discontinued" => Some(StockStatus::Discontinued),
            _ => None,
        }
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses the calculator may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellableStatus {
    InStock,
    LowStock,
    OutOfStock,
    OnBackorder,
}

impl From<SellableStatus> for StockStatus {
    fn from(value: SellableStatus) -> Self {
        match value {
            SellableStatus::InStock => StockStatus::InStock,
            SellableStatus::LowStock => StockStatus::LowStock,
            SellableStatus::OutOfStock => StockStatus::OutOfStock,
            SellableStatus::OnBackorder => StockStatus::OnBackorder,
        }
    }
}

/// Stock state of a product or variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", content = "status", rename_all = "snake_case")]
pub enum StockState {
    /// Computed from quantity (tracked) or set by the operator (untracked).
    Auto(SellableStatus),
    /// Sticky operator decision; quantity changes never clear it.
    Discontinued,
}

impl StockState {
    pub fn status(self) -> StockStatus {
        match self {
            StockState::Auto(s) => s.into(),
            StockState::Discontinued => StockStatus::Discontinued,
        }
    }

    pub fn is_available(self) -> bool {
        self.status().is_available()
    }

    /// Explicit operator edit: the only way in or out of `Discontinued`.
    pub fn manual(status: StockStatus) -> Self {
        match status {
            StockStatus::InStock => StockState::Auto(SellableStatus::InStock),
            StockStatus::LowStock => StockState::Auto(SellableStatus::LowStock),
            StockStatus::OutOfStock => StockState::Auto(SellableStatus::OutOfStock),
            StockStatus::OnBackorder => StockState::Auto(SellableStatus::OnBackorder),
            StockStatus::Discontinued => StockState::Discontinued,
        }
    }
}

/// Inputs of the stock status calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockInputs {
    /// Tracked quantity. Negative values are units owed on backorder.
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub allow_backorders: bool,
    pub track_quantity: bool,
}

/// Derive the stock state for a write.
///
/// Untracked entities keep whatever the operator set; `Discontinued` is kept
/// regardless of quantity. The threshold boundary is inclusive
/// (`quantity == threshold` is low stock).
pub fn derive_stock_state(inputs: StockInputs, current: StockState) -> StockState {
    if !inputs.track_quantity {
        return current;
    }
    if current == StockState::Discontinued {
        return current;
    }

    let status = if inputs.quantity <= 0 {
        if inputs.allow_backorders {
            SellableStatus::OnBackorder
        } else {
            SellableStatus::OutOfStock
        }
    } else if inputs.quantity <= inputs.low_stock_threshold {
        SellableStatus::LowStock
    } else {
        SellableStatus::InStock
    };

    StockState::Auto(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(quantity: i64, threshold: i64, backorders: bool) -> StockInputs {
        StockInputs {
            quantity,
            low_stock_threshold: threshold,
            allow_backorders: backorders,
            track_quantity: true,
        }
    }

    const ANY: StockState = StockState::Auto(SellableStatus::InStock);

    #[test]
    fn threshold_boundary_is_low_stock() {
        let state = derive_stock_state(tracked(5, 5, false), ANY);
        assert_eq!(state.status(), StockStatus::LowStock);
    }

    #[test]
    fn above_threshold_is_in_stock() {
        let state = derive_stock_state(tracked(6, 5, false), ANY);
        assert_eq!(state.status(), StockStatus::InStock);
    }

    #[test]
    fn zero_quantity_depends_on_backorders() {
        assert_eq!(
            derive_stock_state(tracked(0, 5, false), ANY).status(),
            StockStatus::OutOfStock
        );
        assert_eq!(
            derive_stock_state(tracked(0, 5, true), ANY).status(),
            StockStatus::OnBackorder
        );
    }

    #[test]
    fn owed_units_count_as_zero() {
        assert_eq!(
            derive_stock_state(tracked(-3, 5, true), ANY).status(),
            StockStatus::OnBackorder
        );
    }

    #[test]
    fn untracked_keeps_operator_status() {
        let inputs = StockInputs {
            track_quantity: false,
            ..tracked(0, 5, false)
        };
        let current = StockState::Auto(SellableStatus::LowStock);
        assert_eq!(derive_stock_state(inputs, current), current);
    }

    #[test]
    fn discontinued_is_sticky() {
        let state = derive_stock_state(tracked(100, 5, false), StockState::Discontinued);
        assert_eq!(state, StockState::Discontinued);
    }

    #[test]
    fn manual_edit_can_clear_discontinued() {
        let state = StockState::manual(StockStatus::InStock);
        let recomputed = derive_stock_state(tracked(0, 5, false), state);
        assert_eq!(recomputed.status(), StockStatus::OutOfStock);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn reference(quantity: i64, threshold: i64, backorders: bool) -> StockStatus {
            if quantity <= 0 && backorders {
                StockStatus::OnBackorder
            } else if quantity <= 0 {
                StockStatus::OutOfStock
            } else if quantity <= threshold {
                StockStatus::LowStock
            } else {
                StockStatus::InStock
            }
        }

        fn any_state() -> impl Strategy<Value = StockState> {
            prop_oneof![
                Just(StockState::Auto(SellableStatus::InStock)),
                Just(StockState::Auto(SellableStatus::LowStock)),
                Just(StockState::Auto(SellableStatus::OutOfStock)),
                Just(StockState::Auto(SellableStatus::OnBackorder)),
                Just(StockState::Discontinued),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 500, ..ProptestConfig::default() })]

            /// Tracked entities: status is a pure function of the inputs, except discontinued.
            #[test]
            fn tracked_status_is_derived(
                quantity in -50i64..500,
                threshold in 0i64..100,
                backorders in any::<bool>(),
                current in any_state(),
            ) {
                let derived = derive_stock_state(tracked(quantity, threshold, backorders), current);
                if current == StockState::Discontinued {
                    prop_assert_eq!(derived, StockState::Discontinued);
                } else {
                    prop_assert_eq!(derived.status(), reference(quantity, threshold, backorders));
                }
            }

            /// The calculator never produces Discontinued on its own.
            #[test]
            fn calculator_never_discontinues(
                quantity in -50i64..500,
                threshold in 0i64..100,
                backorders in any::<bool>(),
            ) {
                let derived = derive_stock_state(
                    tracked(quantity, threshold, backorders),
                    StockState::Auto(SellableStatus::InStock),
                );
                prop_assert_ne!(derived, StockState::Discontinued);
            }
        }
    }
}
