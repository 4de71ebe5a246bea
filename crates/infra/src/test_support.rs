//! Fixtures shared by the service and adapter tests.

use std::sync::Arc;

use chrono::Utc;

use bazaar_catalog::{Product, Variant};
use bazaar_core::{ExpectedVersion, OrderId, ProductId, VariantId};
use bazaar_events::InMemoryEventBus;
use bazaar_orders::{
    Coordinates, Customer, Order, OrderDraft, OrderEvent, OrderLine, OrderNumber, ShippingAddress,
    ShippingPolicy,
};

use crate::services::{CheckoutService, OrderReversal, PlaceOrder, Ports};
use crate::store::{CatalogStore, InMemoryCommerceStore};

pub fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Buyer".to_string(),
        line1: "1 Market Street".to_string(),
        line2: None,
        city: "Lahore".to_string(),
        state: None,
        postal_code: Some("54000".to_string()),
        country: "PK".to_string(),
        phone: None,
        coordinates: Some(Coordinates { lat: 31.52, lng: 74.35 }),
    }
}

pub fn guest_order(email: &str) -> Order {
    let now = Utc::now();
    let line = OrderLine::new(ProductId::new(), "Tea", 2, 450, None).unwrap();
    Order::place(
        OrderDraft {
            id: OrderId::new(),
            order_number: OrderNumber::generate(now.date_naive(), &mut rand::rng()),
            customer: Customer::Guest {
                email: email.to_string(),
            },
            lines: vec![line],
            shipping_address: address(),
            payment_method: "cod".to_string(),
            currency: "usd".to_string(),
            customer_note: None,
            placed_at: now,
        },
        &ShippingPolicy::default(),
    )
    .unwrap()
}

pub fn place_request(guest_email: Option<&str>) -> PlaceOrder {
    PlaceOrder {
        shipping_address: address(),
        payment_method: "cod".to_string(),
        currency: "usd".to_string(),
        items: None,
        guest_email: guest_email.map(str::to_string),
        customer_note: None,
        save_address: false,
        idempotency_key: None,
    }
}

/// A tracked product with `quantity` units, threshold 5, no backorders.
pub async fn seed_product(
    store: &InMemoryCommerceStore,
    slug: &str,
    quantity: i64,
    price: u64,
) -> Product {
    let mut product = Product::new(ProductId::new(), slug, slug.to_uppercase(), price);
    product.quantity = quantity;
    product.refresh_stock_state();
    store.save_product(&product, ExpectedVersion::Exact(0)).await.unwrap()
}

pub async fn seed_variant(
    store: &InMemoryCommerceStore,
    product: &Product,
    sku: &str,
    quantity: i64,
    is_default: bool,
) -> Variant {
    let mut variant = Variant::new(VariantId::new(), product.id, sku);
    variant.quantity = quantity;
    variant.is_default = is_default;
    variant.refresh_stock_state();
    let saved = store.save_variant(&variant, ExpectedVersion::Exact(0)).await.unwrap();

    let mut parent = store.product(product.id).await.unwrap().unwrap();
    let variants = store.variants_of(product.id).await.unwrap();
    let expected = ExpectedVersion::Exact(parent.version);
    if bazaar_catalog::apply_rollup(&mut parent, &variants, true) {
        store.save_product(&parent, expected).await.unwrap();
    }
    saved
}

pub struct Harness {
    pub store: Arc<InMemoryCommerceStore>,
    pub ports: Ports,
    pub events: Arc<InMemoryEventBus<OrderEvent>>,
    pub checkout: CheckoutService,
    pub reversal: OrderReversal,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryCommerceStore::new());
        let ports = Ports::in_memory(store.clone());
        let events = Arc::new(InMemoryEventBus::new());
        let checkout =
            CheckoutService::new(ports.clone(), events.clone(), ShippingPolicy::flat(250));
        let reversal = OrderReversal::new(ports.clone(), events.clone());
        Self {
            store,
            ports,
            events,
            checkout,
            reversal,
        }
    }
}
