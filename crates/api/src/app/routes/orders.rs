use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use bazaar_infra::services::LineSource;

use crate::app::dto::{CreateOrderRequest, OrderCreatedResponse};
use crate::app::errors::{commerce_error_to_response, json_rejection_to_response};
use crate::app::guest_cookie::GuestCookie;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Place an order from the request's items, the saved cart or the guest
/// cookie. A retry carrying the same `Idempotency-Key` gets the first order
/// back unchanged.
#[instrument(skip_all, fields(authenticated = principal.is_some()))]
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cookie): Extension<GuestCookie>,
    principal: Option<Extension<PrincipalContext>>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(body) = body.map_err(json_rejection_to_response)?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let shopper = principal.as_deref().map(PrincipalContext::shopper);
    let guest_cart = match shopper {
        Some(_) => None,
        None => Some(cookie.decode(&headers)),
    };

    let placement = services
        .checkout
        .place(shopper.as_ref(), guest_cart.as_ref(), body.into_command(idempotency_key))
        .await
        .map_err(commerce_error_to_response)?;

    if placement.replayed {
        info!(
            order_number = %placement.order.order_number,
            "returned existing order for repeated submission"
        );
    }

    let mut response = (
        StatusCode::CREATED,
        Json(OrderCreatedResponse::from(&placement.order)),
    )
        .into_response();
    if placement.source == LineSource::GuestCart {
        if let Some(value) = cookie.clear() {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    Ok(response)
}
