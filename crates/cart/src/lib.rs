//! Cart domain module.
//!
//! A cart is a plain value: an ordered list of lines keyed by
//! `(product, variant)`. Where it is stored (user record or guest cookie) is
//! decided at the boundary; stock and availability checks are applied by the
//! cart service before these pure mutations run.

pub mod cart;
pub mod line;
pub mod merge;

pub use cart::Cart;
pub use line::{CartLine, LineKey, MAX_LINE_QUANTITY, MAX_LINES, validate_quantity};
pub use merge::{MergeOutcome, MergeWarning, combine};
