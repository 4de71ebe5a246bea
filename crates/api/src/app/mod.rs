//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage ports, event bus and application services
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `guest_cookie.rs`: anonymous cart cookie codec
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod guest_cookie;
pub mod routes;
pub mod services;

use guest_cookie::GuestCookie;
use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &AppConfig, services: Arc<AppServices>) -> Router {
    let jwt = Arc::new(bazaar_auth::Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let api = routes::router()
        .layer(Extension(services))
        .layer(Extension(GuestCookie::new(config.guest_cookie_secure)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::identity_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(api)
}
