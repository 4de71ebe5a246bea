//! Catalog domain module: products, variants and their stock state.
//!
//! Pure, deterministic business rules (no IO, no HTTP, no storage):
//! the stock status calculator, the hierarchical availability resolver,
//! default-variant selection and the variant→product rollup.

pub mod analytics;
pub mod availability;
pub mod maintenance;
pub mod product;
pub mod stock;
pub mod variant;

pub use analytics::ProductAnalytics;
pub use availability::{
    NoAvailableVariant, StockCap, Unavailable, UnavailableReason, UnavailableScope,
    all_variants_unavailable, purchasable, select_default_variant, stock_cap,
};
pub use maintenance::{apply_rollup, defaults_to_clear};
pub use product::Product;
pub use stock::{SellableStatus, StockInputs, StockState, StockStatus, derive_stock_state};
pub use variant::Variant;
