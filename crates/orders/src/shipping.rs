use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMode {
    AlwaysFree,
    FreeAboveThreshold,
    Flat,
}

impl ShippingMode {
    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always_free" => Ok(ShippingMode::AlwaysFree),
            "free_above_threshold" => Ok(ShippingMode::FreeAboveThreshold),
            "flat" => Ok(ShippingMode::Flat),
            other => Err(DomainError::validation(format!("unknown shipping mode: {other}"))),
        }
    }
}

/// Store-wide shipping configuration. Amounts are in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    pub mode: ShippingMode,
    pub free_threshold: u64,
    pub flat_cost: u64,
}

impl ShippingPolicy {
    pub fn flat(cost: u64) -> Self {
        Self {
            mode: ShippingMode::Flat,
            free_threshold: 0,
            flat_cost: cost,
        }
    }

    pub fn always_free() -> Self {
        Self {
            mode: ShippingMode::AlwaysFree,
            free_threshold: 0,
            flat_cost: 0,
        }
    }

    pub fn free_above(threshold: u64, flat_cost: u64) -> Self {
        Self {
            mode: ShippingMode::FreeAboveThreshold,
            free_threshold: threshold,
            flat_cost,
        }
    }

    /// Shipping charge for an order with the given subtotal.
    pub fn shipping_for(&self, subtotal: u64) -> u64 {
        match self.mode {
            ShippingMode::AlwaysFree => 0,
            ShippingMode::FreeAboveThreshold if subtotal >= self.free_threshold => 0,
            ShippingMode::FreeAboveThreshold | ShippingMode::Flat => self.flat_cost,
        }
    }
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self::flat(0)
    }
}
