//! Error types of the storage ports and of the application services.

use thiserror::Error;

use bazaar_catalog::Unavailable;
use bazaar_core::{DomainError, ProductId, VariantId};

/// Storage adapter failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// Optimistic concurrency check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A unique field already holds this value (`sku`, `slug`, `order_number`,
    /// `idempotency_key`).
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Inventory ledger failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient stock for {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        variant_id: Option<VariantId>,
        available: i64,
        requested: u32,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the cart/checkout/admin services.
///
/// Everything except `Internal` is user-facing; `Internal` carries detail for
/// logs only.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommerceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(Unavailable),

    #[error("{message}")]
    InsufficientStock {
        message: String,
        available_quantity: i64,
        current_in_cart: u32,
        available_to_add: i64,
    },

    #[error("cart is empty")]
    EmptyCart,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommerceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    /// Stock error for a line that already holds `in_cart` units.
    pub fn insufficient_stock(available: i64, in_cart: u32) -> Self {
        let available = available.max(0);
        let available_to_add = (available - i64::from(in_cart)).max(0);
        let message = if available == 0 {
            "This item is out of stock".to_string()
        } else if in_cart > 0 {
            format!("Only {available} available ({in_cart} already in your cart)")
        } else {
            format!("Only {available} available")
        };
        Self::InsufficientStock {
            message,
            available_quantity: available,
            current_in_cart: in_cart,
            available_to_add,
        }
    }
}

impl From<DomainError> for CommerceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => CommerceError::Validation(msg),
            DomainError::InvalidId(msg) => CommerceError::Validation(format!("invalid id: {msg}")),
            DomainError::NotFound(what) => CommerceError::not_found(what),
            DomainError::Conflict(msg) => CommerceError::Conflict(msg),
            err @ DomainError::InvalidTransition { .. } => {
                CommerceError::Validation(err.to_string())
            }
        }
    }
}

impl From<StoreError> for CommerceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => CommerceError::NotFound("not found".to_string()),
            StoreError::Conflict(msg) => CommerceError::Conflict(msg),
            StoreError::Duplicate(field) => {
                CommerceError::Conflict(format!("{field} already exists"))
            }
            StoreError::Backend(msg) => CommerceError::Internal(msg),
        }
    }
}

impl From<LedgerError> for CommerceError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientStock {
                available,
                requested,
                ..
            } => CommerceError::insufficient_stock(available, requested),
            LedgerError::Store(e) => e.into(),
        }
    }
}

impl From<Unavailable> for CommerceError {
    fn from(value: Unavailable) -> Self {
        CommerceError::Unavailable(value)
    }
}
