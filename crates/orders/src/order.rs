use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, Entity, OrderId, ProductId, UserId, VariantId};

use crate::address::ShippingAddress;
use crate::number::OrderNumber;
use crate::shipping::ShippingPolicy;
use crate::status::{OrderStatus, PaymentStatus};

/// Frozen copy of the variant as it was when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSnapshot {
    pub sku: String,
    pub options: BTreeMap<String, String>,
    pub price: u64,
}

/// Order line. Price, total and variant details never change after placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: u32,
    /// Unit price in minor units.
    pub price: u64,
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_details: Option<VariantSnapshot>,
}

impl OrderLine {
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        price: u64,
        variant: Option<(VariantId, VariantSnapshot)>,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("order line quantity must be positive"));
        }
        let total = price
            .checked_mul(u64::from(quantity))
            .ok_or_else(|| DomainError::validation("order line total overflows"))?;
        let (variant_id, variant_details) = match variant {
            Some((id, snapshot)) => (Some(id), Some(snapshot)),
            None => (None, None),
        };
        Ok(Self {
            product_id,
            variant_id,
            product_name: product_name.into(),
            quantity,
            price,
            total,
            variant_details,
        })
    }
}

/// Who placed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Customer {
    Registered {
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    Guest {
        email: String,
    },
}

impl Customer {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Customer::Registered { user_id, .. } => Some(*user_id),
            Customer::Guest { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Customer::Registered { email, .. } => email.as_deref(),
            Customer::Guest { email } => Some(email),
        }
    }
}

/// Everything needed to place an order; totals are computed by [`Order::place`].
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer: Customer,
    pub lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub currency: String,
    pub customer_note: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer: Customer,
    pub lines: Vec<OrderLine>,
    pub subtotal: u64,
    pub shipping: u64,
    pub total: u64,
    pub currency: String,
    pub payment_method: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub shipping_address: ShippingAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Order {
    /// Freeze a draft into a pending order.
    pub fn place(draft: OrderDraft, shipping_policy: &ShippingPolicy) -> DomainResult<Self> {
        if draft.lines.is_empty() {
            return Err(DomainError::validation("order has no lines"));
        }
        if draft.payment_method.trim().is_empty() {
            return Err(DomainError::validation("paymentMethod is required"));
        }
        if draft.currency.trim().is_empty() {
            return Err(DomainError::validation("currency is required"));
        }
        draft.shipping_address.validate()?;

        let subtotal = draft
            .lines
            .iter()
            .try_fold(0u64, |acc, l| acc.checked_add(l.total))
            .ok_or_else(|| DomainError::validation("order subtotal overflows"))?;
        let shipping = shipping_policy.shipping_for(subtotal);
        let total = subtotal
            .checked_add(shipping)
            .ok_or_else(|| DomainError::validation("order total overflows"))?;

        Ok(Self {
            id: draft.id,
            order_number: draft.order_number,
            customer: draft.customer,
            lines: draft.lines,
            subtotal,
            shipping,
            total,
            currency: draft.currency.trim().to_ascii_uppercase(),
            payment_method: draft.payment_method,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            tracking_number: None,
            shipping_address: draft.shipping_address,
            customer_note: draft.customer_note,
            created_at: draft.placed_at,
            updated_at: draft.placed_at,
            version: 0,
        })
    }

    /// Move the fulfilment status. Re-applying the current status is a no-op.
    pub fn transition_status(&mut self, next: OrderStatus, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                machine: "order",
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        self.touch(at);
        Ok(())
    }

    pub fn transition_payment(
        &mut self,
        next: PaymentStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.payment_status == next {
            return Ok(());
        }
        if !self.payment_status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                machine: "payment",
                from: self.payment_status.as_str(),
                to: next.as_str(),
            });
        }
        self.payment_status = next;
        self.touch(at);
        Ok(())
    }

    /// Set or clear the carrier tracking number. Blank clears.
    pub fn set_tracking_number(&mut self, tracking: Option<String>, at: DateTime<Utc>) {
        self.tracking_number = tracking
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
        self.version += 1;
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
pub(crate) fn test_draft(lines: Vec<OrderLine>) -> OrderDraft {
    use chrono::NaiveDate;

    let placed_at = Utc::now();
    OrderDraft {
        id: OrderId::new(),
        order_number: OrderNumber::generate(
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            &mut rand::rng(),
        ),
        customer: Customer::Guest {
            email: "guest@example.com".to_string(),
        },
        lines,
        shipping_address: crate::address::test_address(),
        payment_method: "cod".to_string(),
        currency: "usd".to_string(),
        customer_note: None,
        placed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: u64, quantity: u32) -> OrderLine {
        OrderLine::new(ProductId::new(), "Mug", quantity, price, None).unwrap()
    }

    #[test]
    fn totals_are_computed_at_placement() {
        let draft = test_draft(vec![line(1_000, 2), line(250, 4)]);
        let order = Order::place(draft, &ShippingPolicy::free_above(5_000, 700)).unwrap();

        assert_eq!(order.subtotal, 3_000);
        assert_eq!(order.shipping, 700);
        assert_eq!(order.total, 3_700);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.currency, "USD");
    }

    #[test]
    fn empty_draft_is_rejected() {
        assert!(Order::place(test_draft(vec![]), &ShippingPolicy::default()).is_err());
    }

    #[test]
    fn missing_coordinates_rejected() {
        let mut draft = test_draft(vec![line(100, 1)]);
        draft.shipping_address.coordinates = None;
        assert!(Order::place(draft, &ShippingPolicy::default()).is_err());
    }

    #[test]
    fn snapshot_survives_serialization() {
        let snapshot = VariantSnapshot {
            sku: "MUG-RED".to_string(),
            options: BTreeMap::from([("color".to_string(), "red".to_string())]),
            price: 1_200,
        };
        let variant = Some((VariantId::new(), snapshot.clone()));
        let l = OrderLine::new(ProductId::new(), "Mug", 1, 1_200, variant).unwrap();
        let json = serde_json::to_value(&l).unwrap();
        assert_eq!(json["variantDetails"]["sku"], "MUG-RED");
        assert_eq!(l.variant_details, Some(snapshot));
    }

    #[test]
    fn invalid_transition_leaves_order_unchanged() {
        let mut order =
            Order::place(test_draft(vec![line(100, 1)]), &ShippingPolicy::default()).unwrap();
        let before = order.clone();

        assert!(order.transition_status(OrderStatus::Delivered, Utc::now()).is_err());
        assert_eq!(order, before);

        order.transition_status(OrderStatus::Processing, Utc::now()).unwrap();
        assert_eq!(order.version, 1);
    }

    #[test]
    fn blank_tracking_number_clears() {
        let mut order =
            Order::place(test_draft(vec![line(100, 1)]), &ShippingPolicy::default()).unwrap();
        order.set_tracking_number(Some(" TRK-1 ".to_string()), Utc::now());
        assert_eq!(order.tracking_number.as_deref(), Some("TRK-1"));
        order.set_tracking_number(Some("  ".to_string()), Utc::now());
        assert_eq!(order.tracking_number, None);
    }
}
