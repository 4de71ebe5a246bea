//! Admin order management: status/payment/tracking changes and deletion.

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use bazaar_core::{ExpectedVersion, OrderId};
use bazaar_orders::{Order, OrderStatus, PaymentStatus};

use super::Ports;
use super::reversal::{OrderReversal, ReversalReport};
use crate::error::{CommerceError, StoreError};

/// Partial update. Absent fields are left alone; `tracking_number: Some(None)`
/// clears the tracking number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, deserialize_with = "super::double_option::deserialize")]
    pub tracking_number: Option<Option<String>>,
}

#[derive(Clone)]
pub struct OrderService {
    ports: Ports,
    reversal: OrderReversal,
}

impl OrderService {
    pub fn new(ports: Ports, reversal: OrderReversal) -> Self {
        Self { ports, reversal }
    }

    pub async fn get(&self, id: OrderId) -> Result<Order, CommerceError> {
        self.ports
            .orders
            .get(id)
            .await?
            .ok_or_else(|| CommerceError::not_found("order"))
    }

    /// Apply a partial update; every transition is checked before anything
    /// is stored.
    #[instrument(skip(self), err)]
    pub async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, CommerceError> {
        let mut order = self.get(id).await?;
        let expected = ExpectedVersion::Exact(order.version);
        let now = Utc::now();

        if let Some(status) = update.status {
            order.transition_status(status, now)?;
        }
        if let Some(payment) = update.payment_status {
            order.transition_payment(payment, now)?;
        }
        if let Some(tracking) = update.tracking_number {
            order.set_tracking_number(tracking, now);
        }
        if ExpectedVersion::Exact(order.version) == expected {
            return Ok(order);
        }

        self.ports.orders.update(&order, expected).await.map_err(|e| match e {
            StoreError::Conflict(_) => {
                CommerceError::Conflict("order was modified concurrently".to_string())
            }
            other => other.into(),
        })?;
        info!(
            order_number = %order.order_number,
            status = order.status.as_str(),
            payment_status = order.payment_status.as_str(),
            "order updated"
        );
        Ok(order)
    }

    pub async fn delete(&self, id: OrderId) -> Result<ReversalReport, CommerceError> {
        self.reversal.delete_order(id).await
    }
}
