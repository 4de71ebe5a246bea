use serde::{Deserialize, Serialize};

use bazaar_cart::{Cart, CartLine, MergeWarning};
use bazaar_core::{OrderId, ProductId, VariantId};
use bazaar_infra::services::{PlaceOrder, RequestedLine};
use bazaar_orders::{Order, OrderStatus, ShippingAddress};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    /// Range-checked by the cart service so the error names the limits.
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFromCartRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub items: Option<Vec<CartLineRequest>>,
    #[serde(default)]
    pub guest_email: Option<String>,
    #[serde(default)]
    pub customer_note: Option<String>,
    #[serde(default)]
    pub save_address: bool,
}

impl CreateOrderRequest {
    pub fn into_command(self, idempotency_key: Option<String>) -> PlaceOrder {
        PlaceOrder {
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            currency: self.currency,
            items: self.items.map(|items| {
                items
                    .into_iter()
                    .map(|l| RequestedLine {
                        product_id: l.product_id,
                        variant_id: l.variant_id,
                        quantity: l.quantity,
                    })
                    .collect()
            }),
            guest_email: self.guest_email,
            customer_note: self.customer_note,
            save_address: self.save_address,
            idempotency_key,
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// Body of every cart mutation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub item_count: u32,
    pub items: Vec<CartLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl CartResponse {
    pub fn from_cart(cart: &Cart) -> Self {
        Self {
            item_count: cart.item_count(),
            items: cart.lines().to_vec(),
            warnings: None,
        }
    }

    pub fn with_warnings(mut self, warnings: &[MergeWarning]) -> Self {
        if !warnings.is_empty() {
            self.warnings = Some(warnings.iter().map(ToString::to_string).collect());
        }
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: OrderId,
    pub order_number: String,
    pub total: u64,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderCreatedResponse {
    pub order: OrderSummary,
}

impl From<&Order> for OrderCreatedResponse {
    fn from(order: &Order) -> Self {
        Self {
            order: OrderSummary {
                id: order.id,
                order_number: order.order_number.to_string(),
                total: order.total,
                status: order.status,
            },
        }
    }
}
