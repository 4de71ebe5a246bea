//! Cart endpoints.
//!
//! Signed-in shoppers use their saved cart; anonymous ones the guest cookie.
//! Each handler loads the cart, runs one cart service call on it and writes
//! it back to wherever it came from.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use bazaar_cart::{Cart, LineKey};
use bazaar_core::UserId;
use bazaar_infra::CommerceError;

use crate::app::dto::{CartLineRequest, CartResponse, RemoveFromCartRequest};
use crate::app::errors::{commerce_error_to_response, json_rejection_to_response};
use crate::app::guest_cookie::GuestCookie;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

/// The request's cart and where to write it back.
struct CartSession {
    owner: Option<UserId>,
    cart: Cart,
}

impl CartSession {
    async fn open(
        services: &AppServices,
        cookie: &GuestCookie,
        principal: Option<&PrincipalContext>,
        headers: &HeaderMap,
    ) -> Result<Self, Response> {
        match principal {
            Some(p) => {
                let cart = services
                    .cart
                    .load(p.user_id())
                    .await
                    .map_err(commerce_error_to_response)?;
                Ok(Self {
                    owner: Some(p.user_id()),
                    cart,
                })
            }
            None => Ok(Self {
                owner: None,
                cart: cookie.decode(headers),
            }),
        }
    }

    async fn save(
        self,
        services: &AppServices,
        cookie: &GuestCookie,
    ) -> Result<Response, Response> {
        let body = Json(CartResponse::from_cart(&self.cart));
        match self.owner {
            Some(user_id) => {
                services
                    .cart
                    .save(user_id, &self.cart)
                    .await
                    .map_err(commerce_error_to_response)?;
                Ok(body.into_response())
            }
            None => {
                let mut response = body.into_response();
                if let Some(value) = cookie.encode(&self.cart) {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Ok(response)
            }
        }
    }
}

#[instrument(skip_all)]
pub async fn add_to_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cookie): Extension<GuestCookie>,
    principal: Option<Extension<PrincipalContext>>,
    headers: HeaderMap,
    body: Result<Json<CartLineRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(body) = body.map_err(json_rejection_to_response)?;
    let mut session = CartSession::open(&services, &cookie, principal.as_deref(), &headers).await?;

    services
        .cart
        .add(&mut session.cart, body.product_id, body.variant_id, body.quantity)
        .await
        .map_err(commerce_error_to_response)?;

    session.save(&services, &cookie).await
}

#[instrument(skip_all)]
pub async fn update_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cookie): Extension<GuestCookie>,
    principal: Option<Extension<PrincipalContext>>,
    headers: HeaderMap,
    body: Result<Json<CartLineRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(body) = body.map_err(json_rejection_to_response)?;
    let mut session = CartSession::open(&services, &cookie, principal.as_deref(), &headers).await?;

    services
        .cart
        .update(&mut session.cart, body.product_id, body.variant_id, body.quantity)
        .await
        .map_err(commerce_error_to_response)?;

    session.save(&services, &cookie).await
}

pub async fn remove_from_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cookie): Extension<GuestCookie>,
    principal: Option<Extension<PrincipalContext>>,
    headers: HeaderMap,
    body: Result<Json<RemoveFromCartRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(body) = body.map_err(json_rejection_to_response)?;
    let mut session = CartSession::open(&services, &cookie, principal.as_deref(), &headers).await?;

    services
        .cart
        .remove(&mut session.cart, LineKey::new(body.product_id, body.variant_id))
        .map_err(commerce_error_to_response)?;

    session.save(&services, &cookie).await
}

pub async fn clear_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cookie): Extension<GuestCookie>,
    principal: Option<Extension<PrincipalContext>>,
) -> Result<Response, Response> {
    let session = CartSession {
        owner: principal.map(|p| p.user_id()),
        cart: Cart::new(),
    };
    session.save(&services, &cookie).await
}

pub async fn get_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cookie): Extension<GuestCookie>,
    principal: Option<Extension<PrincipalContext>>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let session = CartSession::open(&services, &cookie, principal.as_deref(), &headers).await?;
    let view = services
        .cart
        .view(&session.cart)
        .await
        .map_err(commerce_error_to_response)?;
    Ok(Json(view).into_response())
}

/// Fold the guest cookie into the signed-in shopper's cart.
///
/// The cookie is expired on every attempt, including failed ones, so a bad
/// guest cart cannot be merged twice.
#[instrument(skip_all)]
pub async fn merge_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cookie): Extension<GuestCookie>,
    principal: Option<Extension<PrincipalContext>>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let principal = authz::require_user(principal.as_deref())?;
    let user_id = principal.user_id();

    let result = async {
        let guest = cookie.decode(&headers);
        let user_cart = services.cart.load(user_id).await?;
        let outcome = services.cart.merge(&user_cart, guest.lines()).await?;
        services.cart.save(user_id, &outcome.cart).await?;
        info!(
            user_id = %user_id,
            merged_lines = guest.len(),
            warnings = outcome.warnings.len(),
            "guest cart merged"
        );
        let response = CartResponse::from_cart(&outcome.cart).with_warnings(&outcome.warnings);
        Ok::<_, CommerceError>(response)
    }
    .await;

    let mut response = match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => commerce_error_to_response(e),
    };
    if let Some(value) = cookie.clear() {
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(response)
}
