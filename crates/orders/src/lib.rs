//! Orders domain module.
//!
//! Orders are write-once: lines, prices and totals are frozen when the order
//! is placed. Only status, payment status and the tracking number change
//! afterwards, through the transition rules in [`status`].

pub mod address;
pub mod event;
pub mod number;
pub mod order;
pub mod shipping;
pub mod status;

pub use address::{Coordinates, ShippingAddress};
pub use event::OrderEvent;
pub use number::OrderNumber;
pub use order::{Customer, Order, OrderDraft, OrderLine, VariantSnapshot};
pub use shipping::{ShippingMode, ShippingPolicy};
pub use status::{OrderStatus, PaymentStatus};
