//! Post-commit side channels: confirmation email and delivery location capture.
//!
//! Runs on its own thread off the event bus. Nothing here can affect an order
//! that was already committed; failures are logged and dropped.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use bazaar_events::{Event, EventBus};
use bazaar_orders::{Coordinates, Order, OrderEvent};

use super::{WorkerHandle, spawn_loop};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("side channel failed: {0}")]
pub struct SideChannelError(pub String);

/// Sends the order confirmation to the customer.
pub trait Mailer: Send + Sync {
    fn send_order_confirmation(&self, email: &str, order: &Order) -> Result<(), SideChannelError>;
}

/// Captures the delivery coordinates of a placed order.
pub trait LocationRecorder: Send + Sync {
    fn record_delivery_location(
        &self,
        order: &Order,
        at: Coordinates,
    ) -> Result<(), SideChannelError>;
}

/// Mailer that only logs. Email delivery is handled outside this service.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_order_confirmation(&self, email: &str, order: &Order) -> Result<(), SideChannelError> {
        info!(
            order_number = %order.order_number,
            recipient = email,
            total = order.total,
            "order confirmation queued"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogLocationRecorder;

impl LocationRecorder for LogLocationRecorder {
    fn record_delivery_location(
        &self,
        order: &Order,
        at: Coordinates,
    ) -> Result<(), SideChannelError> {
        info!(
            order_number = %order.order_number,
            lat = at.lat,
            lng = at.lng,
            "delivery location recorded"
        );
        Ok(())
    }
}

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    locations: Arc<dyn LocationRecorder>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, locations: Arc<dyn LocationRecorder>) -> Self {
        Self { mailer, locations }
    }

    /// Subscribe to `bus` and handle order events on a background thread.
    pub fn spawn<B>(self, bus: &B) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<OrderEvent> + ?Sized,
    {
        let sub = bus.subscribe();
        spawn_loop("order-notifier", sub, move |event: OrderEvent| self.handle(&event))
    }

    /// Run every side channel for one event. Each channel is isolated: the
    /// first failure is reported after the others have run.
    pub fn handle(&self, event: &OrderEvent) -> Result<(), SideChannelError> {
        match event {
            OrderEvent::Placed { order, .. } => {
                let mut first_err = None;

                match order.customer.email() {
                    Some(email) => {
                        if let Err(err) = self.mailer.send_order_confirmation(email, order) {
                            warn!(
                                order_number = %order.order_number,
                                error = %err,
                                "confirmation email failed"
                            );
                            first_err.get_or_insert(err);
                        }
                    }
                    None => warn!(
                        order_number = %order.order_number,
                        "no email on order, skipping confirmation"
                    ),
                }

                if let Some(at) = order.shipping_address.coordinates {
                    if let Err(err) = self.locations.record_delivery_location(order, at) {
                        warn!(
                            order_number = %order.order_number,
                            error = %err,
                            "location capture failed"
                        );
                        first_err.get_or_insert(err);
                    }
                }

                first_err.map_or(Ok(()), Err)
            }
            OrderEvent::Deleted { order, .. } => {
                info!(
                    event = event.event_type(),
                    order_number = %order.order_number,
                    "order deleted"
                );
                Ok(())
            }
        }
    }
}
