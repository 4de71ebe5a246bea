//! Postgres adapter for every storage port.
//!
//! ## Inventory
//!
//! `commit_sale` runs in one transaction. Each stock target is decremented
//! with a conditional update:
//!
//! ```sql
//! UPDATE products SET quantity = quantity - $n
//! WHERE id = $id AND (NOT track_quantity OR allow_backorders OR quantity >= $n)
//! ```
//!
//! A target that does not match rolls the whole transaction back, so an
//! order's lines are committed together or not at all. The update also takes
//! the row lock, which serialises concurrent checkouts on the same product.
//! Stock status, `total_sold`, analytics and the variant rollup are then
//! recomputed in Rust against the locked rows.
//!
//! ## Error mapping
//!
//! | SQLx error | Code | StoreError |
//! |---|---|---|
//! | unique violation on a named constraint | `23505` | `Duplicate(field)` |
//! | other unique violation | `23505` | `Conflict` |
//! | foreign key violation | `23503` | `NotFound` |
//! | `RowNotFound` | | `NotFound` |
//! | anything else | | `Backend` |

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use bazaar_cart::Cart;
use bazaar_catalog::{Product, ProductAnalytics, StockState, Variant, apply_rollup};
use bazaar_core::{ExpectedVersion, OrderId, ProductId, UserId, VariantId};
use bazaar_orders::{Order, ShippingAddress};

use super::ledger::{self, StockTarget};
use super::{
    AnalyticsSignal, CartRepository, CatalogStore, IdempotencyKey, InventoryLedger, OrderRepository,
    StockMovement, UserDirectory,
};
use crate::error::{LedgerError, StoreError};

const SCHEMA: &str = include_str!("../../migrations/001_commerce.sql");

const PRODUCT_SELECT: &str = r#"
    SELECT id, slug, name, published, quantity, track_quantity, allow_backorders,
           low_stock_threshold, stock, has_variants, total_sold, price, sale_price,
           analytics, version
    FROM products
"#;

const VARIANT_SELECT: &str = r#"
    SELECT id, product_id, sku, options, quantity, track_quantity, allow_backorders,
           low_stock_threshold, stock, is_default, price, total_sold, version
    FROM variants
"#;

type Tx = Transaction<'static, Postgres>;

/// Postgres-backed commerce store.
#[derive(Debug, Clone)]
pub struct PostgresCommerceStore {
    pool: Arc<PgPool>,
}

impl PostgresCommerceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Mirror an account from the identity provider.
    pub async fn register_user(&self, user_id: UserId, email: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(email.trim().to_lowercase())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_user", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Tx, StoreError> {
        self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

#[async_trait]
impl CatalogStore for PostgresCommerceStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("{PRODUCT_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;
        row.as_ref().map(product_from_row).transpose().map_err(|e| map_sqlx_error("product", e))
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("{PRODUCT_SELECT} WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product_by_slug", e))?;
        row.as_ref()
            .map(product_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("product_by_slug", e))
    }

    async fn variant(&self, id: VariantId) -> Result<Option<Variant>, StoreError> {
        let row = sqlx::query(&format!("{VARIANT_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("variant", e))?;
        row.as_ref().map(variant_from_row).transpose().map_err(|e| map_sqlx_error("variant", e))
    }

    async fn variants_of(&self, product_id: ProductId) -> Result<Vec<Variant>, StoreError> {
        let rows = sqlx::query(&format!("{VARIANT_SELECT} WHERE product_id = $1 ORDER BY position"))
            .bind(product_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("variants_of", e))?;
        rows.iter()
            .map(variant_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("variants_of", e))
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn save_product(
        &self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<Product, StoreError> {
        let mut tx = self.begin().await?;
        let current = current_version(&mut tx, "products", product.id.as_uuid()).await?;
        expected
            .check(current)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        let mut stored = product.clone();
        stored.version = current + 1;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, slug, name, published, quantity, track_quantity, allow_backorders,
                low_stock_threshold, stock, has_variants, total_sold, price, sale_price,
                analytics, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                slug = EXCLUDED.slug,
                name = EXCLUDED.name,
                published = EXCLUDED.published,
                quantity = EXCLUDED.quantity,
                track_quantity = EXCLUDED.track_quantity,
                allow_backorders = EXCLUDED.allow_backorders,
                low_stock_threshold = EXCLUDED.low_stock_threshold,
                stock = EXCLUDED.stock,
                has_variants = EXCLUDED.has_variants,
                total_sold = EXCLUDED.total_sold,
                price = EXCLUDED.price,
                sale_price = EXCLUDED.sale_price,
                analytics = EXCLUDED.analytics,
                version = EXCLUDED.version
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(&stored.slug)
        .bind(&stored.name)
        .bind(stored.published)
        .bind(stored.quantity)
        .bind(stored.track_quantity)
        .bind(stored.allow_backorders)
        .bind(stored.low_stock_threshold)
        .bind(Json(stored.stock))
        .bind(stored.has_variants)
        .bind(stored.total_sold as i64)
        .bind(stored.price as i64)
        .bind(stored.sale_price.map(|p| p as i64))
        .bind(Json(&stored.analytics))
        .bind(stored.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_product", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip(self, variant), fields(variant_id = %variant.id), err)]
    async fn save_variant(
        &self,
        variant: &Variant,
        expected: ExpectedVersion,
    ) -> Result<Variant, StoreError> {
        let mut tx = self.begin().await?;
        let current = current_version(&mut tx, "variants", variant.id.as_uuid()).await?;
        expected
            .check(current)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        let mut stored = variant.clone();
        stored.version = current + 1;
        sqlx::query(
            r#"
            INSERT INTO variants (
                id, product_id, sku, options, quantity, track_quantity, allow_backorders,
                low_stock_threshold, stock, is_default, price, total_sold, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                sku = EXCLUDED.sku,
                options = EXCLUDED.options,
                quantity = EXCLUDED.quantity,
                track_quantity = EXCLUDED.track_quantity,
                allow_backorders = EXCLUDED.allow_backorders,
                low_stock_threshold = EXCLUDED.low_stock_threshold,
                stock = EXCLUDED.stock,
                is_default = EXCLUDED.is_default,
                price = EXCLUDED.price,
                total_sold = EXCLUDED.total_sold,
                version = EXCLUDED.version
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.product_id.as_uuid())
        .bind(&stored.sku)
        .bind(Json(&stored.options))
        .bind(stored.quantity)
        .bind(stored.track_quantity)
        .bind(stored.allow_backorders)
        .bind(stored.low_stock_threshold)
        .bind(Json(stored.stock))
        .bind(stored.is_default)
        .bind(stored.price.map(|p| p as i64))
        .bind(stored.total_sold as i64)
        .bind(stored.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_variant", e))?;

        if stored.is_default {
            sqlx::query(
                r#"
                UPDATE variants SET is_default = false, version = version + 1
                WHERE product_id = $1 AND id <> $2 AND is_default
                "#,
            )
            .bind(stored.product_id.as_uuid())
            .bind(stored.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_default_variants", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    async fn record_signal(
        &self,
        product_id: ProductId,
        signal: AnalyticsSignal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT total_sold, analytics FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("record_signal", e))?
            .ok_or(StoreError::NotFound)?;

        let total_sold = row
            .try_get::<i64, _>("total_sold")
            .map_err(|e| map_sqlx_error("record_signal", e))? as u64;
        let mut analytics = row
            .try_get::<Json<ProductAnalytics>, _>("analytics")
            .map_err(|e| map_sqlx_error("record_signal", e))?
            .0;
        match signal {
            AnalyticsSignal::View => analytics.record_view(at, total_sold),
            AnalyticsSignal::CartAdd => analytics.record_cart_add(total_sold),
        }

        sqlx::query("UPDATE products SET analytics = $2 WHERE id = $1")
            .bind(product_id.as_uuid())
            .bind(Json(&analytics))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("record_signal", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresCommerceStore {
    #[instrument(skip(self, movements), fields(lines = movements.len()), err)]
    async fn commit_sale(&self, movements: &[StockMovement]) -> Result<(), LedgerError> {
        let demand = ledger::demand(movements);
        let mut tx = self.begin().await?;

        for (target, requested) in &demand {
            let matched = decrement(&mut tx, *target, *requested).await?;
            if !matched {
                let available = on_hand(&mut tx, *target).await?;
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return match available {
                    None => Err(StoreError::NotFound.into()),
                    Some(available) => Err(LedgerError::InsufficientStock {
                        product_id: target.product_id(),
                        variant_id: target.variant_id(),
                        available: available.max(0),
                        requested: *requested,
                    }),
                };
            }
        }

        // Quantities are committed; book the sale and re-derive status.
        let mut touched: BTreeMap<ProductId, bool> = BTreeMap::new();
        for (target, sold) in demand {
            let product_id = target.product_id();
            let mut status_changed = false;
            if let Some(variant_id) = target.variant_id() {
                let mut variant = lock_variant(&mut tx, variant_id)
                    .await?
                    .ok_or(StoreError::NotFound)?;
                let before = variant.stock;
                variant.record_sale(sold);
                variant.refresh_stock_state();
                status_changed = before != variant.stock;
                write_variant_stock(&mut tx, &variant).await?;
            }
            let mut product = lock_product(&mut tx, product_id).await?.ok_or(StoreError::NotFound)?;
            product.record_sale(sold);
            product.refresh_stock_state();
            write_product_stock(&mut tx, &product).await?;
            *touched.entry(product_id).or_insert(false) |= status_changed;
        }
        for (product_id, status_changed) in touched {
            roll_up(&mut tx, product_id, status_changed).await?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn restore(&self, movement: &StockMovement) -> Result<(), LedgerError> {
        let mut tx = self.begin().await?;
        let mut product = lock_product(&mut tx, movement.product_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        let mut status_changed = false;
        if let Some(variant_id) = movement.variant_id {
            match lock_variant(&mut tx, variant_id).await? {
                Some(mut variant) => {
                    status_changed = ledger::restore_variant(&mut variant, movement.quantity);
                    write_variant_stock(&mut tx, &variant).await?;
                }
                None => warn!(
                    variant_id = %variant_id,
                    "variant gone; restoring product counters only"
                ),
            }
        }
        ledger::restore_product(&mut product, movement.quantity, movement.variant_id.is_none());
        write_product_stock(&mut tx, &product).await?;
        roll_up(&mut tx, movement.product_id, status_changed).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

#[async_trait]
impl CartRepository for PostgresCommerceStore {
    async fn load(&self, user_id: UserId) -> Result<Cart, StoreError> {
        let row = sqlx::query("SELECT items FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_cart", e))?;
        match row {
            Some(row) => Ok(row
                .try_get::<Json<Cart>, _>("items")
                .map_err(|e| map_sqlx_error("load_cart", e))?
                .0),
            None => Ok(Cart::new()),
        }
    }

    async fn save(&self, user_id: UserId, cart: &Cart) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO carts (user_id, items, updated_at) VALUES ($1, $2, now())
            ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, updated_at = now()
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(Json(cart))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_cart", e))?;
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_cart", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresCommerceStore {
    #[instrument(skip(self, order, idempotency), fields(order_number = %order.order_number), err)]
    async fn insert(
        &self,
        order: &Order,
        idempotency: Option<&IdempotencyKey>,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            "INSERT INTO orders (id, order_number, body, version, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(Json(order))
        .bind(order.version as i64)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        if let Some(key) = idempotency {
            sqlx::query("INSERT INTO order_idempotency (scope, key, order_id) VALUES ($1, $2, $3)")
                .bind(&key.scope)
                .bind(&key.key)
                .bind(order.id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_idempotency_key", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT body FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        row.as_ref().map(order_from_row).transpose().map_err(|e| map_sqlx_error("get_order", e))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT o.body
            FROM order_idempotency i
            JOIN orders o ON o.id = i.order_id
            WHERE i.scope = $1 AND i.key = $2
            "#,
        )
        .bind(&key.scope)
        .bind(&key.key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_idempotency_key", e))?;
        row.as_ref()
            .map(order_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_by_idempotency_key", e))
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order.id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?
            .ok_or(StoreError::NotFound)?;
        let current = row
            .try_get::<i64, _>("version")
            .map_err(|e| map_sqlx_error("update_order", e))? as u64;
        expected
            .check(current)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        sqlx::query("UPDATE orders SET body = $2, version = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(Json(order))
            .bind(order.version as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn delete(&self, id: OrderId) -> Result<Order, StoreError> {
        let row = sqlx::query("DELETE FROM orders WHERE id = $1 RETURNING body")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?
            .ok_or(StoreError::NotFound)?;
        order_from_row(&row).map_err(|e| map_sqlx_error("delete_order", e))
    }
}

#[async_trait]
impl UserDirectory for PostgresCommerceStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserId>, StoreError> {
        let row = sqlx::query("SELECT id FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_email", e))?;
        row.map(|r| r.try_get::<Uuid, _>("id").map(UserId::from_uuid))
            .transpose()
            .map_err(|e| map_sqlx_error("find_by_email", e))
    }

    async fn email_of(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT email FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("email_of", e))?;
        row.map(|r| r.try_get::<String, _>("email"))
            .transpose()
            .map_err(|e| map_sqlx_error("email_of", e))
    }

    async fn save_address(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
    ) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT addresses FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_address", e))?
            .ok_or(StoreError::NotFound)?;
        let mut addresses = row
            .try_get::<Json<Vec<ShippingAddress>>, _>("addresses")
            .map_err(|e| map_sqlx_error("save_address", e))?
            .0;
        if addresses.iter().any(|a| a.same_location(address)) {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(false);
        }
        addresses.push(address.clone());

        sqlx::query("UPDATE users SET addresses = $2 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(Json(&addresses))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_address", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(true)
    }
}

// Transaction helpers

/// Locked version of a row, 0 when it does not exist yet.
async fn current_version(tx: &mut Tx, table: &'static str, id: &Uuid) -> Result<u64, StoreError> {
    let row = sqlx::query(&format!("SELECT version FROM {table} WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("current_version", e))?;
    match row {
        Some(row) => Ok(row
            .try_get::<i64, _>("version")
            .map_err(|e| map_sqlx_error("current_version", e))? as u64),
        None => Ok(0),
    }
}

/// Conditional decrement; `false` when the target lacks the stock.
async fn decrement(tx: &mut Tx, target: StockTarget, quantity: u32) -> Result<bool, StoreError> {
    let result = match target {
        StockTarget::Product(product_id) => {
            sqlx::query(
                r#"
                UPDATE products
                SET quantity = CASE WHEN track_quantity THEN quantity - $2 ELSE quantity END
                WHERE id = $1 AND (NOT track_quantity OR allow_backorders OR quantity >= $2)
                "#,
            )
            .bind(product_id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut **tx)
            .await
        }
        StockTarget::Variant(product_id, variant_id) => {
            sqlx::query(
                r#"
                UPDATE variants
                SET quantity = CASE WHEN track_quantity THEN quantity - $3 ELSE quantity END
                WHERE id = $1 AND product_id = $2
                  AND (NOT track_quantity OR allow_backorders OR quantity >= $3)
                "#,
            )
            .bind(variant_id.as_uuid())
            .bind(product_id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&mut **tx)
            .await
        }
    }
    .map_err(|e| map_sqlx_error("decrement_stock", e))?;
    Ok(result.rows_affected() == 1)
}

async fn on_hand(tx: &mut Tx, target: StockTarget) -> Result<Option<i64>, StoreError> {
    let row = match target {
        StockTarget::Product(product_id) => {
            sqlx::query("SELECT quantity FROM products WHERE id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
        }
        StockTarget::Variant(product_id, variant_id) => {
            sqlx::query("SELECT quantity FROM variants WHERE id = $1 AND product_id = $2")
                .bind(variant_id.as_uuid())
                .bind(product_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
        }
    }
    .map_err(|e| map_sqlx_error("on_hand", e))?;
    row.map(|r| r.try_get::<i64, _>("quantity"))
        .transpose()
        .map_err(|e| map_sqlx_error("on_hand", e))
}

async fn lock_product(tx: &mut Tx, id: ProductId) -> Result<Option<Product>, StoreError> {
    let row = sqlx::query(&format!("{PRODUCT_SELECT} WHERE id = $1 FOR UPDATE"))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;
    row.as_ref().map(product_from_row).transpose().map_err(|e| map_sqlx_error("lock_product", e))
}

async fn lock_variant(tx: &mut Tx, id: VariantId) -> Result<Option<Variant>, StoreError> {
    let row = sqlx::query(&format!("{VARIANT_SELECT} WHERE id = $1 FOR UPDATE"))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_variant", e))?;
    row.as_ref().map(variant_from_row).transpose().map_err(|e| map_sqlx_error("lock_variant", e))
}

/// Persist the ledger-owned columns of a product and bump its version.
async fn write_product_stock(tx: &mut Tx, product: &Product) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE products
        SET quantity = $2, stock = $3, has_variants = $4, total_sold = $5, analytics = $6,
            version = version + 1
        WHERE id = $1
        "#,
    )
    .bind(product.id.as_uuid())
    .bind(product.quantity)
    .bind(Json(product.stock))
    .bind(product.has_variants)
    .bind(product.total_sold as i64)
    .bind(Json(&product.analytics))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_product_stock", e))?;
    Ok(())
}

async fn write_variant_stock(tx: &mut Tx, variant: &Variant) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE variants
        SET quantity = $2, stock = $3, total_sold = $4, version = version + 1
        WHERE id = $1
        "#,
    )
    .bind(variant.id.as_uuid())
    .bind(variant.quantity)
    .bind(Json(variant.stock))
    .bind(variant.total_sold as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_variant_stock", e))?;
    Ok(())
}

async fn roll_up(
    tx: &mut Tx,
    product_id: ProductId,
    status_changed: bool,
) -> Result<(), StoreError> {
    let rows = sqlx::query(&format!("{VARIANT_SELECT} WHERE product_id = $1 ORDER BY position"))
        .bind(product_id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("roll_up", e))?;
    if rows.is_empty() {
        return Ok(());
    }
    let variants = rows
        .iter()
        .map(variant_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error("roll_up", e))?;

    let Some(mut product) = lock_product(tx, product_id).await? else {
        return Ok(());
    };
    if apply_rollup(&mut product, &variants, status_changed) {
        write_product_stock(tx, &product).await?;
    }
    Ok(())
}

// Row mapping

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        published: row.try_get("published")?,
        quantity: row.try_get("quantity")?,
        track_quantity: row.try_get("track_quantity")?,
        allow_backorders: row.try_get("allow_backorders")?,
        low_stock_threshold: row.try_get("low_stock_threshold")?,
        stock: row.try_get::<Json<StockState>, _>("stock")?.0,
        has_variants: row.try_get("has_variants")?,
        total_sold: row.try_get::<i64, _>("total_sold")? as u64,
        price: row.try_get::<i64, _>("price")? as u64,
        sale_price: row.try_get::<Option<i64>, _>("sale_price")?.map(|p| p as u64),
        analytics: row.try_get::<Json<ProductAnalytics>, _>("analytics")?.0,
        version: row.try_get::<i64, _>("version")? as u64,
    })
}

fn variant_from_row(row: &PgRow) -> Result<Variant, sqlx::Error> {
    Ok(Variant {
        id: VariantId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        sku: row.try_get("sku")?,
        options: row.try_get::<Json<BTreeMap<String, String>>, _>("options")?.0,
        quantity: row.try_get("quantity")?,
        track_quantity: row.try_get("track_quantity")?,
        allow_backorders: row.try_get("allow_backorders")?,
        low_stock_threshold: row.try_get("low_stock_threshold")?,
        stock: row.try_get::<Json<StockState>, _>("stock")?.0,
        is_default: row.try_get("is_default")?,
        price: row.try_get::<Option<i64>, _>("price")?.map(|p| p as u64),
        total_sold: row.try_get::<i64, _>("total_sold")? as u64,
        version: row.try_get::<i64, _>("version")? as u64,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(row.try_get::<Json<Order>, _>("body")?.0)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => match db_err.constraint() {
                    Some("products_slug_key") => StoreError::Duplicate("slug"),
                    Some("variants_sku_key") => StoreError::Duplicate("sku"),
                    Some("orders_order_number_key") => StoreError::Duplicate("order_number"),
                    Some("order_idempotency_pkey") => StoreError::Duplicate("idempotency_key"),
                    Some("users_email_key") => StoreError::Duplicate("email"),
                    _ => StoreError::Conflict(msg),
                },
                Some("23503") => StoreError::NotFound,
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
