//! In-memory adapter for every storage port (tests/dev).
//!
//! All state sits behind one `RwLock`, so the ledger's check-then-apply runs
//! under a single write lock and concurrent checkouts cannot oversell.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use bazaar_cart::Cart;
use bazaar_catalog::{Product, Variant, apply_rollup, defaults_to_clear};
use bazaar_core::{ExpectedVersion, OrderId, ProductId, UserId, VariantId};
use bazaar_orders::{Order, ShippingAddress};

use super::ledger::{self, StockTarget};
use super::{
    AnalyticsSignal, CartRepository, CatalogStore, IdempotencyKey, InventoryLedger, OrderRepository,
    StockMovement, UserDirectory,
};
use crate::error::{LedgerError, StoreError};

#[derive(Debug, Default)]
struct UserRecord {
    email: String,
    addresses: Vec<ShippingAddress>,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    /// Insertion order doubles as "creation order" for `variants_of`.
    variants: Vec<Variant>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    idempotency: HashMap<IdempotencyKey, OrderId>,
    users: HashMap<UserId, UserRecord>,
}

impl State {
    fn variant_mut(&mut self, id: VariantId) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.id == id)
    }

    fn variants_of(&self, product_id: ProductId) -> Vec<Variant> {
        self.variants
            .iter()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect()
    }

    /// Refresh the parent's rolled-up quantity (and status, when a variant
    /// status moved) after a ledger write.
    fn roll_up(&mut self, product_id: ProductId, status_changed: bool) {
        let variants = self.variants_of(product_id);
        if variants.is_empty() {
            return;
        }
        if let Some(product) = self.products.get_mut(&product_id) {
            if apply_rollup(product, &variants, status_changed) {
                product.version += 1;
            }
        }
    }
}

/// In-memory commerce store.
#[derive(Debug, Default)]
pub struct InMemoryCommerceStore {
    state: RwLock<State>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account (the identity provider owns accounts; this is the
    /// local mirror used for guest-email matching and saved addresses).
    pub fn register_user(
        &self,
        user_id: UserId,
        email: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.users.insert(
            user_id,
            UserRecord {
                email: email.into().trim().to_lowercase(),
                addresses: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn saved_addresses(&self, user_id: UserId) -> Result<Vec<ShippingAddress>, StoreError> {
        let state = self.read()?;
        Ok(state
            .users
            .get(&user_id)
            .map(|u| u.addresses.clone())
            .unwrap_or_default())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCommerceStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn variant(&self, id: VariantId) -> Result<Option<Variant>, StoreError> {
        Ok(self.read()?.variants.iter().find(|v| v.id == id).cloned())
    }

    async fn variants_of(&self, product_id: ProductId) -> Result<Vec<Variant>, StoreError> {
        Ok(self.read()?.variants_of(product_id))
    }

    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<Product, StoreError> {
        let mut state = self.write()?;
        if state
            .products
            .values()
            .any(|p| p.id != product.id && p.slug == product.slug)
        {
            return Err(StoreError::Duplicate("slug"));
        }

        let current = state.products.get(&product.id).map(|p| p.version).unwrap_or(0);
        expected
            .check(current)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        let mut stored = product.clone();
        stored.version = current + 1;
        state.products.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save_variant(
        &self,
        variant: &Variant,
        expected: ExpectedVersion,
    ) -> Result<Variant, StoreError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&variant.product_id) {
            return Err(StoreError::NotFound);
        }
        if state
            .variants
            .iter()
            .any(|v| v.id != variant.id && v.sku == variant.sku)
        {
            return Err(StoreError::Duplicate("sku"));
        }

        let position = state.variants.iter().position(|v| v.id == variant.id);
        let current = position.map(|i| state.variants[i].version).unwrap_or(0);
        expected
            .check(current)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        let mut stored = variant.clone();
        stored.version = current + 1;
        match position {
            Some(i) => state.variants[i] = stored.clone(),
            None => state.variants.push(stored.clone()),
        }
        if stored.is_default {
            let siblings = state.variants_of(stored.product_id);
            for id in defaults_to_clear(&siblings, stored.id) {
                if let Some(sibling) = state.variant_mut(id) {
                    sibling.is_default = false;
                    sibling.version += 1;
                }
            }
        }
        Ok(stored)
    }

    async fn record_signal(
        &self,
        product_id: ProductId,
        signal: AnalyticsSignal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let product = state.products.get_mut(&product_id).ok_or(StoreError::NotFound)?;
        let total_sold = product.total_sold;
        match signal {
            AnalyticsSignal::View => product.analytics.record_view(at, total_sold),
            AnalyticsSignal::CartAdd => product.analytics.record_cart_add(total_sold),
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryCommerceStore {
    async fn commit_sale(&self, movements: &[StockMovement]) -> Result<(), LedgerError> {
        let mut state = self.write()?;

        // Check every target before touching anything.
        for (target, requested) in ledger::demand(movements) {
            let inputs = match target {
                StockTarget::Product(pid) => state
                    .products
                    .get(&pid)
                    .ok_or(StoreError::NotFound)?
                    .stock_inputs(),
                StockTarget::Variant(pid, vid) => {
                    if !state.products.contains_key(&pid) {
                        return Err(StoreError::NotFound.into());
                    }
                    state
                        .variants
                        .iter()
                        .find(|v| v.id == vid && v.product_id == pid)
                        .ok_or(StoreError::NotFound)?
                        .stock_inputs()
                }
            };
            if let Some(available) = ledger::shortfall(inputs, requested) {
                return Err(LedgerError::InsufficientStock {
                    product_id: target.product_id(),
                    variant_id: target.variant_id(),
                    available,
                    requested,
                });
            }
        }

        let mut touched: BTreeMap<ProductId, bool> = BTreeMap::new();
        for m in movements {
            let status_changed = match m.variant_id {
                Some(vid) => state
                    .variant_mut(vid)
                    .map(|v| {
                        let changed = ledger::sell_variant(v, m.quantity);
                        v.version += 1;
                        changed
                    })
                    .unwrap_or(false),
                None => false,
            };
            if let Some(product) = state.products.get_mut(&m.product_id) {
                ledger::sell_product(product, m.quantity, m.variant_id.is_none());
                product.version += 1;
            }
            *touched.entry(m.product_id).or_insert(false) |= status_changed;
        }
        for (product_id, status_changed) in touched {
            state.roll_up(product_id, status_changed);
        }
        Ok(())
    }

    async fn restore(&self, movement: &StockMovement) -> Result<(), LedgerError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&movement.product_id) {
            return Err(StoreError::NotFound.into());
        }

        let mut status_changed = false;
        if let Some(vid) = movement.variant_id {
            match state.variant_mut(vid) {
                Some(v) => {
                    status_changed = ledger::restore_variant(v, movement.quantity);
                    v.version += 1;
                }
                None => warn!(variant_id = %vid, "variant gone; restoring product counters only"),
            }
        }
        if let Some(product) = state.products.get_mut(&movement.product_id) {
            ledger::restore_product(product, movement.quantity, movement.variant_id.is_none());
            product.version += 1;
        }
        state.roll_up(movement.product_id, status_changed);
        Ok(())
    }
}

#[async_trait]
impl CartRepository for InMemoryCommerceStore {
    async fn load(&self, user_id: UserId) -> Result<Cart, StoreError> {
        Ok(self.read()?.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn save(&self, user_id: UserId, cart: &Cart) -> Result<(), StoreError> {
        self.write()?.carts.insert(user_id, cart.clone());
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> Result<(), StoreError> {
        self.write()?.carts.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryCommerceStore {
    async fn insert(
        &self,
        order: &Order,
        idempotency: Option<&IdempotencyKey>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::Duplicate("order_number"));
        }
        if let Some(key) = idempotency {
            if state.idempotency.contains_key(key) {
                return Err(StoreError::Duplicate("idempotency_key"));
            }
            state.idempotency.insert(key.clone(), order.id);
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Order>, StoreError> {
        let state = self.read()?;
        Ok(state
            .idempotency
            .get(key)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let stored = state.orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
        expected
            .check(stored.version)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        *stored = order.clone();
        Ok(())
    }

    async fn delete(&self, id: OrderId) -> Result<Order, StoreError> {
        let mut state = self.write()?;
        let order = state.orders.remove(&id).ok_or(StoreError::NotFound)?;
        state.idempotency.retain(|_, v| *v != id);
        Ok(order)
    }
}

#[async_trait]
impl UserDirectory for InMemoryCommerceStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserId>, StoreError> {
        let needle = email.trim().to_lowercase();
        Ok(self
            .read()?
            .users
            .iter()
            .find(|(_, u)| u.email == needle)
            .map(|(id, _)| *id))
    }

    async fn email_of(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.users.get(&user_id).map(|u| u.email.clone()))
    }

    async fn save_address(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
    ) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        if user.addresses.iter().any(|a| a.same_location(address)) {
            return Ok(false);
        }
        user.addresses.push(address.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_catalog::StockStatus;

    fn product(quantity: i64) -> Product {
        let mut p = Product::new(ProductId::new(), format!("p-{}", ProductId::new()), "P", 1_000);
        p.quantity = quantity;
        p.refresh_stock_state();
        p
    }

    #[tokio::test]
    async fn stale_product_write_is_a_conflict() {
        let store = InMemoryCommerceStore::new();
        let saved = store.save_product(&product(5), ExpectedVersion::Exact(0)).await.unwrap();
        assert_eq!(saved.version, 1);

        let err = store
            .save_product(&saved, ExpectedVersion::Exact(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_sku_is_rejected() {
        let store = InMemoryCommerceStore::new();
        let p = store.save_product(&product(0), ExpectedVersion::Any).await.unwrap();
        let a = Variant::new(VariantId::new(), p.id, "SKU-1");
        let b = Variant::new(VariantId::new(), p.id, "SKU-1");

        store.save_variant(&a, ExpectedVersion::Exact(0)).await.unwrap();
        assert_eq!(
            store.save_variant(&b, ExpectedVersion::Exact(0)).await,
            Err(StoreError::Duplicate("sku"))
        );
    }

    #[tokio::test]
    async fn saving_a_default_clears_siblings_in_the_same_write() {
        let store = InMemoryCommerceStore::new();
        let p = store.save_product(&product(0), ExpectedVersion::Any).await.unwrap();
        let other = store.save_product(&product(0), ExpectedVersion::Any).await.unwrap();
        let mut a = Variant::new(VariantId::new(), p.id, "A");
        a.is_default = true;
        let a = store.save_variant(&a, ExpectedVersion::Exact(0)).await.unwrap();
        let mut elsewhere = Variant::new(VariantId::new(), other.id, "X");
        elsewhere.is_default = true;
        store.save_variant(&elsewhere, ExpectedVersion::Exact(0)).await.unwrap();

        let mut b = Variant::new(VariantId::new(), p.id, "B");
        b.is_default = true;
        store.save_variant(&b, ExpectedVersion::Exact(0)).await.unwrap();

        let a_now = store.variant(a.id).await.unwrap().unwrap();
        assert!(!a_now.is_default);
        assert_eq!(a_now.version, a.version + 1);
        assert!(store.variant(b.id).await.unwrap().unwrap().is_default);
        assert!(store.variant(elsewhere.id).await.unwrap().unwrap().is_default);

        // A stale writer holding the old copy of A cannot resurrect it silently.
        let err = store.save_variant(&a, ExpectedVersion::Exact(a.version)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn commit_is_all_or_nothing() {
        let store = InMemoryCommerceStore::new();
        let plenty = store.save_product(&product(10), ExpectedVersion::Any).await.unwrap();
        let scarce = store.save_product(&product(1), ExpectedVersion::Any).await.unwrap();

        let err = store
            .commit_sale(&[
                StockMovement { product_id: plenty.id, variant_id: None, quantity: 2 },
                StockMovement { product_id: scarce.id, variant_id: None, quantity: 2 },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 1, requested: 2, .. }));

        let plenty = store.product(plenty.id).await.unwrap().unwrap();
        assert_eq!(plenty.quantity, 10);
        assert_eq!(plenty.total_sold, 0);
    }

    #[tokio::test]
    async fn selling_last_variant_unit_rolls_product_out_of_stock() {
        let store = InMemoryCommerceStore::new();
        let mut p = product(0);
        p.has_variants = true;
        p.stock = bazaar_catalog::StockState::Auto(bazaar_catalog::SellableStatus::InStock);
        let p = store.save_product(&p, ExpectedVersion::Any).await.unwrap();
        let mut v = Variant::new(VariantId::new(), p.id, "ONLY-ONE");
        v.quantity = 1;
        v.refresh_stock_state();
        let v = store.save_variant(&v, ExpectedVersion::Any).await.unwrap();

        store
            .commit_sale(&[StockMovement { product_id: p.id, variant_id: Some(v.id), quantity: 1 }])
            .await
            .unwrap();

        let p = store.product(p.id).await.unwrap().unwrap();
        assert_eq!(p.stock_status(), StockStatus::OutOfStock);
        assert_eq!(p.quantity, 0);
        assert_eq!(p.total_sold, 1);
    }

    #[tokio::test]
    async fn saved_addresses_are_deduplicated() {
        let store = InMemoryCommerceStore::new();
        let user = UserId::new();
        store.register_user(user, "Buyer@Example.com").unwrap();
        let address = ShippingAddress {
            full_name: "B".into(),
            line1: "1 Road".into(),
            line2: None,
            city: "Town".into(),
            state: None,
            postal_code: None,
            country: "US".into(),
            phone: None,
            coordinates: None,
        };

        assert!(store.save_address(user, &address).await.unwrap());
        assert!(!store.save_address(user, &address).await.unwrap());
        assert_eq!(store.find_by_email("buyer@example.com").await.unwrap(), Some(user));
    }
}
