//! Service wiring: storage ports, event bus and application services.

use std::sync::Arc;

use bazaar_events::InMemoryEventBus;
use bazaar_infra::services::{
    CartService, CatalogService, CheckoutService, OrderReversal, OrderService, Ports,
    VariantMaintenance,
};
use bazaar_infra::store::InMemoryCommerceStore;
use bazaar_orders::{OrderEvent, ShippingPolicy};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppServices {
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub catalog: CatalogService,
    pub variants: VariantMaintenance,
    pub events: Arc<InMemoryEventBus<OrderEvent>>,
}

impl AppServices {
    pub fn new(ports: Ports, shipping: ShippingPolicy) -> Self {
        let events = Arc::new(InMemoryEventBus::new());
        let reversal = OrderReversal::new(ports.clone(), events.clone());
        Self {
            cart: CartService::new(ports.catalog.clone(), ports.carts.clone()),
            checkout: CheckoutService::new(ports.clone(), events.clone(), shipping),
            orders: OrderService::new(ports.clone(), reversal),
            catalog: CatalogService::new(ports.clone()),
            variants: VariantMaintenance::new(ports),
            events,
        }
    }

    /// Everything backed by one fresh in-memory store.
    pub fn in_memory(shipping: ShippingPolicy) -> Self {
        Self::new(Ports::in_memory(Arc::new(InMemoryCommerceStore::new())), shipping)
    }
}

/// Build services for the configured backend.
///
/// With the `postgres` feature and `DATABASE_URL` set, every port is backed
/// by Postgres (migrations applied on startup); otherwise by memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    #[cfg(feature = "postgres")]
    if let Some(url) = config.database_url.as_deref() {
        use anyhow::Context;

        let store = bazaar_infra::store::postgres::PostgresCommerceStore::connect(url)
            .await
            .context("failed to connect to postgres")?;
        store.migrate().await.context("failed to apply migrations")?;
        let store = Arc::new(store);
        let ports = Ports {
            catalog: store.clone(),
            ledger: store.clone(),
            orders: store.clone(),
            carts: store.clone(),
            users: store,
        };
        tracing::info!("using postgres storage");
        return Ok(AppServices::new(ports, config.shipping));
    }

    if config.database_url.is_some() {
        tracing::warn!(
            "DATABASE_URL is set but the postgres feature is disabled; using in-memory storage"
        );
    }
    Ok(AppServices::in_memory(config.shipping))
}
