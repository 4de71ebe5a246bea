//! Order Reversal: the delete lifecycle hook.
//!
//! The order row goes first, so a repeated delete finds nothing and cannot
//! restore stock twice. Lines are then restored one by one; a failing line is
//! logged and reported without blocking the others.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use bazaar_core::OrderId;
use bazaar_events::{EventBus, InMemoryEventBus};
use bazaar_orders::{Order, OrderEvent};

use super::Ports;
use crate::error::CommerceError;
use crate::store::StockMovement;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineFailure {
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalReport {
    #[serde(skip)]
    pub order: Order,
    pub restored_lines: usize,
    pub failed_lines: Vec<LineFailure>,
}

#[derive(Clone)]
pub struct OrderReversal {
    ports: Ports,
    events: Arc<InMemoryEventBus<OrderEvent>>,
}

impl OrderReversal {
    pub fn new(ports: Ports, events: Arc<InMemoryEventBus<OrderEvent>>) -> Self {
        Self { ports, events }
    }

    #[instrument(skip(self), err)]
    pub async fn delete_order(&self, id: OrderId) -> Result<ReversalReport, CommerceError> {
        let order = self
            .ports
            .orders
            .delete(id)
            .await
            .map_err(|e| match e {
                crate::error::StoreError::NotFound => CommerceError::not_found("order"),
                other => other.into(),
            })?;

        let mut restored_lines = 0;
        let mut failed_lines = Vec::new();
        for (index, line) in order.lines.iter().enumerate() {
            let movement = StockMovement {
                product_id: line.product_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
            };
            match self.ports.ledger.restore(&movement).await {
                Ok(()) => restored_lines += 1,
                Err(err) => {
                    warn!(
                        order_number = %order.order_number,
                        line = index,
                        product_id = %line.product_id,
                        error = %err,
                        "failed to restore stock for order line"
                    );
                    failed_lines.push(LineFailure {
                        line: index,
                        error: err.to_string(),
                    });
                }
            }
        }

        let event = OrderEvent::Deleted {
            order: order.clone(),
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.events.publish(event) {
            warn!(
                order_number = %order.order_number,
                error = ?err,
                "failed to publish order deleted event"
            );
        }

        info!(
            order_number = %order.order_number,
            restored_lines,
            failed_lines = failed_lines.len(),
            "order deleted"
        );
        Ok(ReversalReport {
            order,
            restored_lines,
            failed_lines,
        })
    }
}
