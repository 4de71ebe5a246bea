//! Guest cart cookie codec.
//!
//! Anonymous carts live entirely in one cookie: the cart's JSON
//! (`{"items":[...]}`) percent-encoded. The cart service never sees the
//! cookie; handlers decode it into a [`Cart`] and encode the result back.

use axum::http::{HeaderMap, HeaderValue, header};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use tracing::debug;

use bazaar_cart::Cart;

pub const COOKIE_NAME: &str = "guest_cart";

/// 30 days.
const MAX_AGE_SECONDS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default)]
pub struct GuestCookie {
    pub secure: bool,
}

impl GuestCookie {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// Cart from the request's cookie. Missing or unreadable cookies yield an
    /// empty cart; the lines are normalised as untrusted input.
    pub fn decode(&self, headers: &HeaderMap) -> Cart {
        let Some(json) = cookie_value(headers, COOKIE_NAME) else {
            return Cart::new();
        };
        match serde_json::from_str::<Cart>(&json) {
            Ok(cart) => Cart::from_untrusted(cart.into_lines()),
            Err(e) => {
                debug!(error = %e, "discarding unreadable guest cart cookie");
                Cart::new()
            }
        }
    }

    /// `Set-Cookie` value persisting `cart`; an empty cart clears the cookie.
    pub fn encode(&self, cart: &Cart) -> Option<HeaderValue> {
        if cart.is_empty() {
            return self.clear();
        }
        let json = serde_json::to_string(cart).ok()?;
        let cookie = self.cookie(json).max_age(Duration::seconds(MAX_AGE_SECONDS)).build();
        to_header(&cookie)
    }

    /// `Set-Cookie` value expiring the cookie.
    pub fn clear(&self) -> Option<HeaderValue> {
        let mut cookie = self.cookie(String::new()).build();
        cookie.make_removal();
        to_header(&cookie)
    }

    fn cookie(&self, value: String) -> cookie::CookieBuilder<'static> {
        Cookie::build((COOKIE_NAME, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
    }
}

fn to_header(cookie: &Cookie<'_>) -> Option<HeaderValue> {
    HeaderValue::from_str(&cookie.encoded().to_string()).ok()
}

/// Percent-decoded value of the named cookie across every `Cookie` header.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
