//! Product analytics counters.
//!
//! Conversion rates are never stored independently: they are recomputed from
//! the raw counters and `total_sold` every time one of them moves.

use bazaar_core::ValueObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAnalytics {
    pub view_count: u64,
    pub add_to_cart_count: u64,
    pub wishlist_count: u64,
    /// Orders per 100 views.
    pub conversion_rate: f64,
    /// Orders per 100 cart additions.
    pub cart_conversion_rate: f64,
    pub last_viewed_at: Option<DateTime<Utc>>,
}

impl ValueObject for ProductAnalytics {}

/// Percentage of `numerator / denominator`, rounded to two decimals; 0 when empty.
fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let pct = numerator as f64 / denominator as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Conversion and cart-conversion rates for the given counters.
pub fn conversion_rates(views: u64, cart_adds: u64, total_sold: u64) -> (f64, f64) {
    (rate(total_sold, views), rate(total_sold, cart_adds))
}

impl ProductAnalytics {
    pub fn refresh(&mut self, total_sold: u64) {
        let (conversion, cart_conversion) =
            conversion_rates(self.view_count, self.add_to_cart_count, total_sold);
        self.conversion_rate = conversion;
        self.cart_conversion_rate = cart_conversion;
    }

    pub fn record_view(&mut self, at: DateTime<Utc>, total_sold: u64) {
        self.view_count = self.view_count.saturating_add(1);
        self.last_viewed_at = Some(at);
        self.refresh(total_sold);
    }

    pub fn record_cart_add(&mut self, total_sold: u64) {
        self.add_to_cart_count = self.add_to_cart_count.saturating_add(1);
        self.refresh(total_sold);
    }
}
