use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn validate(&self) -> DomainResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(DomainError::validation("latitude must be between -90 and 90"));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(DomainError::validation("longitude must be between -180 and 180"));
        }
        Ok(())
    }
}

/// Delivery address. Orders are only accepted with coordinates: the courier
/// cannot deliver without a geolocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl ShippingAddress {
    pub fn validate(&self) -> DomainResult<()> {
        for (field, value) in [
            ("fullName", &self.full_name),
            ("line1", &self.line1),
            ("city", &self.city),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("shippingAddress.{field} is required")));
            }
        }
        self.coordinates
            .as_ref()
            .ok_or_else(|| DomainError::validation("shippingAddress.coordinates are required"))?
            .validate()
    }

    /// Same place, ignoring contact details. Used to de-duplicate saved
    /// addresses.
    pub fn same_location(&self, other: &ShippingAddress) -> bool {
        let norm = |s: &str| s.trim().to_lowercase();
        norm(&self.line1) == norm(&other.line1)
            && self.line2.as_deref().map(norm) == other.line2.as_deref().map(norm)
            && norm(&self.city) == norm(&other.city)
            && self.postal_code.as_deref().map(norm) == other.postal_code.as_deref().map(norm)
            && norm(&self.country) == norm(&other.country)
    }
}

#[cfg(test)]
pub(crate) fn test_address() -> ShippingAddress {
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
