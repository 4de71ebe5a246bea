use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_events::Event;

use crate::order::Order;

/// Committed order lifecycle facts, consumed by side channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order: Order, occurred_at: DateTime<Utc> },
    Deleted { order: Order, occurred_at: DateTime<Utc> },
}

impl OrderEvent {
    pub fn order(&self) -> &Order {
        match self {
            OrderEvent::Placed { order, .. } | OrderEvent::Deleted { order, .. } => order,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed { .. } => "orders.order.placed",
            OrderEvent::Deleted { .. } => "orders.order.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed { occurred_at, .. } | OrderEvent::Deleted { occurred_at, .. } => {
                *occurred_at
            }
        }
    }
}
