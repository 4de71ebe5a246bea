use chrono::NaiveDate;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

const SUFFIX_LEN: usize = 6;

/// Human-facing order number: `ORD-YYYYMMDD-XXXXXX`.
///
/// Uniqueness is enforced by the order store; callers regenerate on conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate<R: Rng + ?Sized>(date: NaiveDate, rng: &mut R) -> Self {
        let suffix: String = rng
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        Self(format!("ORD-{}-{suffix}", date.format("%Y%m%d")))
    }

    /// Wrap a stored value as-is.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_prefix_date_suffix() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let number = OrderNumber::generate(date, &mut rand::rng());
        let s = number.as_str();

        assert!(s.starts_with("ORD-20260307-"));
        let suffix = &s["ORD-20260307-".len()..];
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
