use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult};

use crate::line::{CartLine, LineKey, MAX_LINE_QUANTITY, MAX_LINES, validate_quantity};

/// Ordered list of cart lines, at most one per [`LineKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    items: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cart from untrusted lines (e.g. a guest cookie).
    ///
    /// Duplicate keys are summed, quantities clamped to the line limit,
    /// zero-quantity lines dropped and the list truncated to [`MAX_LINES`].
    pub fn from_untrusted(lines: Vec<CartLine>) -> Self {
        let mut cart = Cart::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            let key = line.key();
            match cart.position(key) {
                Some(i) => {
                    let merged = cart.items[i].quantity.saturating_add(line.quantity);
                    cart.items[i].quantity = merged.min(MAX_LINE_QUANTITY);
                }
                None if cart.items.len() < MAX_LINES => {
                    cart.items.push(CartLine {
                        quantity: line.quantity.min(MAX_LINE_QUANTITY),
                        ..line
                    });
                }
                None => {}
            }
        }
        cart
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.items
    }

    pub fn into_lines(self) -> Vec<CartLine> {
        self.items
    }

    pub fn get(&self, key: LineKey) -> Option<&CartLine> {
        self.items.iter().find(|l| l.key() == key)
    }

    /// Quantity already held for `key` (0 when absent).
    pub fn quantity_of(&self, key: LineKey) -> u32 {
        self.get(key).map(|l| l.quantity).unwrap_or(0)
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, key: LineKey) -> Option<usize> {
        self.items.iter().position(|l| l.key() == key)
    }

    /// Quantity the line would hold after adding `quantity`, without mutating.
    pub fn preview_add(&self, key: LineKey, quantity: u32) -> DomainResult<u32> {
        let quantity = validate_quantity(i64::from(quantity), 1)?;
        match self.get(key) {
            Some(existing) => {
                let merged = existing.quantity + quantity;
                if merged > MAX_LINE_QUANTITY {
                    return Err(DomainError::validation(format!(
                        "cannot hold more than {MAX_LINE_QUANTITY} of one item \
                         (already {} in cart)",
                        existing.quantity
                    )));
                }
                Ok(merged)
            }
            None if self.items.len() >= MAX_LINES => Err(DomainError::validation(format!(
                "cart cannot hold more than {MAX_LINES} different items"
            ))),
            None => Ok(quantity),
        }
    }

    /// Add `quantity` to the line for `key`, merging with an existing line.
    ///
    /// Returns the resulting line quantity.
    pub fn add(&mut self, key: LineKey, quantity: u32, now: DateTime<Utc>) -> DomainResult<u32> {
        let merged = self.preview_add(key, quantity)?;
        match self.position(key) {
            Some(i) => self.items[i].quantity = merged,
            None => self.items.push(CartLine::new(key, merged, now)),
        }
        Ok(merged)
    }

    /// Set the quantity of an existing line; `0` removes it.
    pub fn set_quantity(&mut self, key: LineKey, quantity: u32) -> DomainResult<()> {
        let quantity = validate_quantity(i64::from(quantity), 0)?;
        let i = self.position(key).ok_or(DomainError::NotFound("cart item"))?;
        if quantity == 0 {
            self.items.remove(i);
        } else {
            self.items[i].quantity = quantity;
        }
        Ok(())
    }

    pub fn remove(&mut self, key: LineKey) -> DomainResult<CartLine> {
        let i = self.position(key).ok_or(DomainError::NotFound("cart item"))?;
        Ok(self.items.remove(i))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Keep only the lines for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&CartLine) -> bool) {
        self.items.retain(keep);
    }

    /// Lower a line's quantity to `max` if it holds more. Returns the
    /// previous quantity when clamped.
    pub fn clamp(&mut self, key: LineKey, max: u32) -> Option<u32> {
        let i = self.position(key)?;
        let line = &mut self.items[i];
        if line.quantity <= max {
            return None;
        }
        let previous = line.quantity;
        line.quantity = max;
        Some(previous)
    }

    pub(crate) fn push_unchecked(&mut self, line: CartLine) {
        self.items.push(line);
    }

    pub(crate) fn line_mut(&mut self, key: LineKey) -> Option<&mut CartLine> {
        self.items.iter_mut().find(|l| l.key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{ProductId, VariantId};

    fn key() -> LineKey {
        LineKey::new(ProductId::new(), None)
    }

    #[test]
    fn add_merges_duplicate_keys() {
        let mut cart = Cart::new();
        let k = key();
        cart.add(k, 2, Utc::now()).unwrap();
        assert_eq!(cart.add(k, 3, Utc::now()).unwrap(), 5);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn variant_is_part_of_the_key() {
        let mut cart = Cart::new();
        let p = ProductId::new();
        cart.add(LineKey::new(p, None), 1, Utc::now()).unwrap();
        cart.add(LineKey::new(p, Some(VariantId::new())), 1, Utc::now()).unwrap();
        assert_eq!(cart.len(), 2);
    }

    #[test]
    fn add_of_101_is_rejected_and_cart_unchanged() {
        let mut cart = Cart::new();
        cart.add(key(), 1, Utc::now()).unwrap();
        let before = cart.clone();

        let err = cart.add(key(), 101, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(cart, before);
    }

    #[test]
    fn merged_quantity_over_limit_is_rejected() {
        let mut cart = Cart::new();
        let k = key();
        cart.add(k, 60, Utc::now()).unwrap();
        assert!(cart.add(k, 41, Utc::now()).is_err());
        assert_eq!(cart.quantity_of(k), 60);
    }

    #[test]
    fn fifty_first_line_is_rejected() {
        let mut cart = Cart::new();
        for _ in 0..MAX_LINES {
            cart.add(key(), 1, Utc::now()).unwrap();
        }
        assert!(cart.add(key(), 1, Utc::now()).is_err());
        assert_eq!(cart.len(), MAX_LINES);
    }

    #[test]
    fn set_quantity_zero_removes() {
        let mut cart = Cart::new();
        let k = key();
        cart.add(k, 4, Utc::now()).unwrap();
        cart.set_quantity(k, 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn remove_missing_line_is_not_found() {
        let mut cart = Cart::new();
        assert_eq!(cart.remove(key()), Err(DomainError::NotFound("cart item")));
    }

    #[test]
    fn untrusted_lines_are_sanitized() {
        let k = key();
        let now = Utc::now();
        let lines = vec![
            CartLine::new(k, 80, now),
            CartLine::new(k, 80, now),
            CartLine::new(LineKey::new(ProductId::new(), None), 0, now),
        ];
        let cart = Cart::from_untrusted(lines);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.quantity_of(k), MAX_LINE_QUANTITY);
    }

    #[test]
    fn clamp_reports_previous_quantity() {
        let mut cart = Cart::new();
        let k = key();
        cart.add(k, 9, Utc::now()).unwrap();
        assert_eq!(cart.clamp(k, 4), Some(9));
        assert_eq!(cart.clamp(k, 4), None);
        assert_eq!(cart.quantity_of(k), 4);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Adding a fresh key and removing it restores the previous cart.
            #[test]
            fn add_then_remove_is_identity(
                existing in prop::collection::vec(1u32..=100, 0..49),
                q in 1u32..=100,
            ) {
                let mut cart = Cart::new();
                for quantity in existing {
                    cart.add(key(), quantity, Utc::now()).unwrap();
                }
                let before = cart.clone();
                let k = key();

                cart.add(k, q, Utc::now()).unwrap();
                cart.remove(k).unwrap();
                prop_assert_eq!(cart, before);
            }

            /// No sequence of adds breaks the line or cart limits.
            #[test]
            fn limits_hold(ops in prop::collection::vec((0usize..60, 0u32..150), 0..200)) {
                let keys: Vec<LineKey> = (0..60).map(|_| key()).collect();
                let mut cart = Cart::new();
                for (i, q) in ops {
                    let _ = cart.add(keys[i], q, Utc::now());
                }
                prop_assert!(cart.len() <= MAX_LINES);
                let in_range = |l: &CartLine| (1..=MAX_LINE_QUANTITY).contains(&l.quantity);
                prop_assert!(cart.lines().iter().all(in_range));
            }
        }
    }
}
