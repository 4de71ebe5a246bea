//! Storage ports.
//!
//! Services depend on these traits only. [`in_memory::InMemoryCommerceStore`]
//! implements all of them for tests and single-process deployments; the
//! Postgres adapter (feature `postgres`) is the persistent one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bazaar_cart::Cart;
use bazaar_catalog::{Product, Variant};
use bazaar_core::{ExpectedVersion, OrderId, ProductId, UserId, VariantId};
use bazaar_orders::{Order, ShippingAddress};

use crate::error::{LedgerError, StoreError};

pub mod in_memory;
pub(crate) mod ledger;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryCommerceStore;

/// Shopper interaction counted in product analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsSignal {
    View,
    CartAdd,
}

/// Catalog collaborator: products and variants by id/slug.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError>;

    async fn variant(&self, id: VariantId) -> Result<Option<Variant>, StoreError>;

    /// Variants of a product in creation order.
    async fn variants_of(&self, product_id: ProductId) -> Result<Vec<Variant>, StoreError>;

    /// Insert or update a product. An absent product counts as version 0.
    /// Returns the stored copy with its new version.
    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<Product, StoreError>;

    /// Insert or update a variant; `sku` must be unique across the catalog.
    ///
    /// Saving a default variant clears the flag on its siblings in the same
    /// write, so readers never observe two defaults.
    async fn save_variant(
        &self,
        variant: &Variant,
        expected: ExpectedVersion,
    ) -> Result<Variant, StoreError>;

    /// Bump an analytics counter. Does not change the product version.
    async fn record_signal(
        &self,
        product_id: ProductId,
        signal: AnalyticsSignal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Stock decrement/restore for one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

/// Inventory ledger: the only writer of stock quantities on the sale path.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Apply all movements of one order atomically.
    ///
    /// Per target (variant when given, product otherwise) the summed quantity
    /// is checked against stock unless the target is untracked or allows
    /// backorders. Either every movement is applied (quantity decremented,
    /// `total_sold` incremented, status re-derived, variant rollup refreshed)
    /// or none is.
    async fn commit_sale(&self, movements: &[StockMovement]) -> Result<(), LedgerError>;

    /// Reverse one movement: restore tracked quantity and decrement
    /// `total_sold` (floored at 0).
    async fn restore(&self, movement: &StockMovement) -> Result<(), LedgerError>;
}

/// Persisted carts of identified shoppers. Guest carts never reach storage.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// The user's cart, empty when none was saved.
    async fn load(&self, user_id: UserId) -> Result<Cart, StoreError>;

    async fn save(&self, user_id: UserId, cart: &Cart) -> Result<(), StoreError>;

    async fn clear(&self, user_id: UserId) -> Result<(), StoreError>;
}

/// Client-supplied key that makes order submission retry-safe, scoped to the
/// submitting identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub scope: String,
    pub key: String,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order. Fails with `Duplicate("order_number")` or
    /// `Duplicate("idempotency_key")`.
    async fn insert(
        &self,
        order: &Order,
        idempotency: Option<&IdempotencyKey>,
    ) -> Result<(), StoreError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Order>, StoreError>;

    /// Persist status/payment/tracking changes of an existing order.
    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Remove an order and return it.
    async fn delete(&self, id: OrderId) -> Result<Order, StoreError>;
}

/// Identity collaborator: accounts and their saved addresses.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserId>, StoreError>;

    async fn email_of(&self, user_id: UserId) -> Result<Option<String>, StoreError>;

    /// Append an address unless the same location is already saved.
    /// Returns `true` when it was added.
    async fn save_address(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
    ) -> Result<bool, StoreError>;
}
