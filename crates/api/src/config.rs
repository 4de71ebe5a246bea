//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `BAZAAR_HOST` - Bind address (default: 0.0.0.0)
//! - `BAZAAR_PORT` - Listen port (default: 8080)
//! - `JWT_SECRET` - HS256 signing secret (insecure dev default when unset)
//! - `SHIPPING_MODE` - `always_free`, `free_above_threshold` or `flat` (default: flat)
//! - `SHIPPING_FREE_THRESHOLD` - Subtotal (minor units) for free shipping (default: 0)
//! - `SHIPPING_FLAT_COST` - Flat shipping charge in minor units (default: 0)
//! - `GUEST_CART_COOKIE_SECURE` - Mark the guest cart cookie `Secure` (default: false)
//! - `DATABASE_URL` - `PostgreSQL` connection string (only with the `postgres` feature)

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tracing::warn;

use bazaar_orders::{ShippingMode, ShippingPolicy};

const DEV_JWT_SECRET: &str = "dev-secret";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub shipping: ShippingPolicy,
    pub guest_cookie_secure: bool,
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let host = parse_var("BAZAAR_HOST", &get("BAZAAR_HOST", "0.0.0.0"))?;
        let port = parse_var("BAZAAR_PORT", &get("BAZAAR_PORT", "8080"))?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let mode = ShippingMode::parse(&get("SHIPPING_MODE", "flat"))
            .map_err(|e| ConfigError::InvalidEnvVar("SHIPPING_MODE".to_string(), e.to_string()))?;
        let shipping = ShippingPolicy {
            mode,
            free_threshold: parse_var(
                "SHIPPING_FREE_THRESHOLD",
                &get("SHIPPING_FREE_THRESHOLD", "0"),
            )?,
            flat_cost: parse_var("SHIPPING_FLAT_COST", &get("SHIPPING_FLAT_COST", "0"))?,
        };

        let guest_cookie_secure = parse_var(
            "GUEST_CART_COOKIE_SECURE",
            &get("GUEST_CART_COOKIE_SECURE", "false"),
        )?;
        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());

        Ok(Self {
            host,
            port,
            jwt_secret,
            shipping,
            guest_cookie_secure,
            database_url,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            shipping: ShippingPolicy::default(),
            guest_cookie_secure: false,
            database_url: None,
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
