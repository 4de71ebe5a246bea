//! Order Placement Engine.
//!
//! Validation pass first (fresh catalog reads, hierarchical availability,
//! stock), then one atomic inventory commit through the ledger, then the
//! order insert. A failed insert restores the committed movements, so either
//! the order exists with its stock taken or nothing changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use bazaar_cart::{Cart, validate_quantity};
use bazaar_catalog::StockCap;
use bazaar_core::{OrderId, ProductId, UserId, VariantId};
use bazaar_events::{EventBus, InMemoryEventBus};
use bazaar_orders::{
    Customer, Order, OrderDraft, OrderEvent, OrderLine, OrderNumber, ShippingAddress,
    ShippingPolicy, VariantSnapshot,
};

use super::{Ports, resolve_purchase};
use crate::error::{CommerceError, LedgerError, StoreError};
use crate::store::{IdempotencyKey, StockMovement};

/// Attempts at drawing an unused order number before giving up.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Authenticated buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shopper {
    pub user_id: UserId,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    /// Raw client value; validated to `1..=100`.
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub currency: String,
    /// Explicit lines take priority over the cart.
    pub items: Option<Vec<RequestedLine>>,
    pub guest_email: Option<String>,
    pub customer_note: Option<String>,
    pub save_address: bool,
    pub idempotency_key: Option<String>,
}

/// Where the order's lines came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    Request,
    SavedCart,
    GuestCart,
}

#[derive(Debug, Clone)]
pub struct Placement {
    pub order: Order,
    /// `true` when an earlier order with the same idempotency key was returned.
    pub replayed: bool,
    pub source: LineSource,
}

enum PersistFailure {
    Replay(Order),
    Failed(CommerceError),
}

#[derive(Clone)]
pub struct CheckoutService {
    ports: Ports,
    events: Arc<InMemoryEventBus<OrderEvent>>,
    shipping: ShippingPolicy,
}

impl CheckoutService {
    pub fn new(
        ports: Ports,
        events: Arc<InMemoryEventBus<OrderEvent>>,
        shipping: ShippingPolicy,
    ) -> Self {
        Self { ports, events, shipping }
    }

    pub fn shipping_policy(&self) -> ShippingPolicy {
        self.shipping
    }

    /// Place an order for `shopper` (or a guest identified by `guest_email`).
    ///
    /// `guest_cart` is the decoded guest cookie, used as the line source for
    /// anonymous checkouts without explicit items.
    #[instrument(skip_all, fields(authenticated = shopper.is_some()), err)]
    pub async fn place(
        &self,
        shopper: Option<&Shopper>,
        guest_cart: Option<&Cart>,
        request: PlaceOrder,
    ) -> Result<Placement, CommerceError> {
        request.shipping_address.validate()?;
        let payment_method = required(&request.payment_method, "paymentMethod")?;
        let currency = required(&request.currency, "currency")?;

        let customer = self.resolve_customer(shopper, request.guest_email.as_deref()).await?;
        let idempotency = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| IdempotencyKey {
                scope: idempotency_scope(shopper, &customer),
                key: k.to_string(),
            });
        if let Some(key) = &idempotency {
            if let Some(order) = self.ports.orders.find_by_idempotency_key(key).await? {
                info!(order_number = %order.order_number, "replaying idempotent order submission");
                return Ok(Placement {
                    order,
                    replayed: true,
                    source: LineSource::Request,
                });
            }
        }

        let (requested, source) = self.line_source(shopper, guest_cart, request.items).await?;

        // Validation pass: nothing is mutated until every line passes.
        let mut lines = Vec::with_capacity(requested.len());
        let mut movements = Vec::with_capacity(requested.len());
        let mut demand: BTreeMap<(ProductId, Option<VariantId>), (u32, StockCap)> = BTreeMap::new();

        for (product_id, variant_id, quantity) in requested {
            let resolved =
                resolve_purchase(self.ports.catalog.as_ref(), product_id, variant_id, true)
                    .await?;
            let unit_price = resolved.unit_price();
            let variant_id = resolved.variant.as_ref().map(|v| v.id);

            let entry = demand
                .entry((product_id, variant_id))
                .or_insert((0, resolved.stock_cap()));
            entry.0 = entry.0.saturating_add(quantity);

            let snapshot = resolved.variant.as_ref().map(|v| {
                (
                    v.id,
                    VariantSnapshot {
                        sku: v.sku.clone(),
                        options: v.options.clone(),
                        price: unit_price,
                    },
                )
            });
            lines.push(OrderLine::new(
                product_id,
                resolved.product.name.clone(),
                quantity,
                unit_price,
                snapshot,
            )?);
            movements.push(StockMovement {
                product_id,
                variant_id,
                quantity,
            });
        }

        for ((product_id, variant_id), (total, cap)) in &demand {
            if let StockCap::Limited(available) = cap {
                if i64::from(*total) > *available {
                    return Err(LedgerError::InsufficientStock {
                        product_id: *product_id,
                        variant_id: *variant_id,
                        available: *available,
                        requested: *total,
                    }
                    .into());
                }
            }
        }

        let placed_at = Utc::now();
        let mut order = Order::place(
            OrderDraft {
                id: OrderId::new(),
                order_number: OrderNumber::generate(placed_at.date_naive(), &mut rand::rng()),
                customer,
                lines,
                shipping_address: request.shipping_address,
                payment_method,
                currency,
                customer_note: request
                    .customer_note
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                placed_at,
            },
            &self.shipping,
        )?;

        // The ledger re-checks stock atomically; a concurrent checkout that
        // got there first surfaces here as InsufficientStock.
        self.ports.ledger.commit_sale(&movements).await?;

        match self.persist(&mut order, idempotency.as_ref()).await {
            Ok(()) => {}
            Err(PersistFailure::Replay(existing)) => {
                self.compensate(&movements).await;
                return Ok(Placement {
                    order: existing,
                    replayed: true,
                    source: LineSource::Request,
                });
            }
            Err(PersistFailure::Failed(err)) => {
                self.compensate(&movements).await;
                return Err(err);
            }
        }

        self.after_commit(&order, shopper, source, request.save_address).await;

        info!(
            order_number = %order.order_number,
            total = order.total,
            lines = order.lines.len(),
            "order placed"
        );
        Ok(Placement {
            order,
            replayed: false,
            source,
        })
    }

    async fn resolve_customer(
        &self,
        shopper: Option<&Shopper>,
        guest_email: Option<&str>,
    ) -> Result<Customer, CommerceError> {
        if let Some(shopper) = shopper {
            let email = match &shopper.email {
                Some(email) => Some(email.clone()),
                None => self.ports.users.email_of(shopper.user_id).await.unwrap_or_else(|err| {
                    warn!(
                        user_id = %shopper.user_id,
                        error = %err,
                        "could not look up customer email"
                    );
                    None
                }),
            };
            return Ok(Customer::Registered {
                user_id: shopper.user_id,
                email,
            });
        }

        let email = guest_email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| CommerceError::validation("guestEmail is required for guest checkout"))?;
        if !looks_like_email(&email) {
            return Err(CommerceError::validation("guestEmail is not a valid email address"));
        }

        // A guest using an existing account's email is treated as that account.
        match self.ports.users.find_by_email(&email).await? {
            Some(user_id) => Ok(Customer::Registered {
                user_id,
                email: Some(email),
            }),
            None => Ok(Customer::Guest { email }),
        }
    }

    async fn line_source(
        &self,
        shopper: Option<&Shopper>,
        guest_cart: Option<&Cart>,
        items: Option<Vec<RequestedLine>>,
    ) -> Result<(Vec<(ProductId, Option<VariantId>, u32)>, LineSource), CommerceError> {
        if let Some(items) = items.filter(|i| !i.is_empty()) {
            let lines = items
                .into_iter()
                .map(|l| Ok((l.product_id, l.variant_id, validate_quantity(l.quantity, 1)?)))
                .collect::<Result<Vec<_>, CommerceError>>()?;
            return Ok((lines, LineSource::Request));
        }

        let (cart, source) = match shopper {
            Some(s) => (self.ports.carts.load(s.user_id).await?, LineSource::SavedCart),
            None => (guest_cart.cloned().unwrap_or_default(), LineSource::GuestCart),
        };
        if cart.is_empty() {
            return Err(CommerceError::EmptyCart);
        }
        let lines = cart
            .lines()
            .iter()
            .map(|l| (l.product_id, l.variant_id, l.quantity))
            .collect();
        Ok((lines, source))
    }

    async fn persist(
        &self,
        order: &mut Order,
        idempotency: Option<&IdempotencyKey>,
    ) -> Result<(), PersistFailure> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            match self.ports.orders.insert(order, idempotency).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Duplicate("order_number")) => {
                    debug!(
                        order_number = %order.order_number,
                        "order number taken, drawing another"
                    );
                    let date = order.created_at.date_naive();
                    order.order_number = OrderNumber::generate(date, &mut rand::rng());
                }
                Err(StoreError::Duplicate("idempotency_key")) => {
                    // Lost a race against a concurrent retry of the same submission.
                    let existing = match idempotency {
                        Some(key) => self.ports.orders.find_by_idempotency_key(key).await,
                        None => Ok(None),
                    };
                    return match existing {
                        Ok(Some(order)) => Err(PersistFailure::Replay(order)),
                        Ok(None) => Err(PersistFailure::Failed(CommerceError::Conflict(
                            "idempotency key already used".to_string(),
                        ))),
                        Err(e) => Err(PersistFailure::Failed(e.into())),
                    };
                }
                Err(e) => return Err(PersistFailure::Failed(e.into())),
            }
        }
        Err(PersistFailure::Failed(CommerceError::Internal(
            "could not allocate a unique order number".to_string(),
        )))
    }

    /// Undo a committed sale after the order could not be stored.
    async fn compensate(&self, movements: &[StockMovement]) {
        for m in movements {
            if let Err(err) = self.ports.ledger.restore(m).await {
                error!(
                    product_id = %m.product_id,
                    quantity = m.quantity,
                    error = %err,
                    "failed to restore stock after aborted order"
                );
            }
        }
    }

    /// Side effects after the order is committed. None of them can fail the
    /// order.
    ///
    /// Only an authenticated shopper's address book is written. A guest whose
    /// email matched an account gets the order linked, not the address saved.
    async fn after_commit(
        &self,
        order: &Order,
        shopper: Option<&Shopper>,
        source: LineSource,
        save_address: bool,
    ) {
        if save_address {
            match shopper {
                Some(shopper) => {
                    let user_id = shopper.user_id;
                    match self.ports.users.save_address(user_id, &order.shipping_address).await {
                        Ok(added) => debug!(user_id = %user_id, added, "saved shipping address"),
                        Err(err) => warn!(
                            user_id = %user_id,
                            error = %err,
                            "failed to save shipping address"
                        ),
                    }
                }
                None => debug!(
                    order_number = %order.order_number,
                    "ignoring saveAddress on anonymous checkout"
                ),
            }
        }

        if source == LineSource::SavedCart {
            if let Some(shopper) = shopper {
                if let Err(err) = self.ports.carts.clear(shopper.user_id).await {
                    warn!(
                        user_id = %shopper.user_id,
                        error = %err,
                        "failed to clear cart after checkout"
                    );
                }
            }
        }

        let event = OrderEvent::Placed {
            order: order.clone(),
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.events.publish(event) {
            warn!(
                order_number = %order.order_number,
                error = ?err,
                "failed to publish order placed event"
            );
        }
    }
}

fn required(value: &str, field: &str) -> Result<String, CommerceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CommerceError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Anonymous submissions are scoped by email even when it matched an
/// account, so they can never replay that account's orders.
fn idempotency_scope(shopper: Option<&Shopper>, customer: &Customer) -> String {
    match shopper {
        Some(shopper) => format!("user:{}", shopper.user_id),
        None => format!("guest:{}", customer.email().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("ab.co"));
    }

    #[test]
    fn scope_separates_guests_from_users() {
        let user = UserId::new();
        let shopper = Shopper {
            user_id: user,
            email: None,
        };
        let registered = Customer::Registered {
            user_id: user,
            email: Some("g@x.io".into()),
        };
        assert_eq!(idempotency_scope(Some(&shopper), &registered), format!("user:{user}"));
        assert_eq!(
            idempotency_scope(None, &Customer::Guest { email: "g@x.io".into() }),
            "guest:g@x.io"
        );
        // Linked by email only: still a guest scope.
        assert_eq!(idempotency_scope(None, &registered), "guest:g@x.io");
    }
}
