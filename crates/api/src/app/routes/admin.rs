//! Operator endpoints: catalog writes and order management.
//!
//! Every handler checks its permission before parsing anything else.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde_json::json;
use tracing::instrument;

use bazaar_auth::Permission;
use bazaar_core::{OrderId, ProductId, VariantId};
use bazaar_infra::services::{OrderUpdate, ProductInput, VariantInput};

use crate::app::errors::{commerce_error_to_response, json_rejection_to_response, parse_id};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id/variants", post(create_variant))
        .route("/variants/:id", put(update_variant))
        .route(
            "/orders/:id",
            get(get_order).patch(update_order).delete(delete_order),
        )
}

#[instrument(skip_all)]
pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    body: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Response, Response> {
    authz::require(principal.as_deref(), &Permission::CATALOG_WRITE)?;
    let Json(input) = body.map_err(json_rejection_to_response)?;

    let product = services
        .catalog
        .create_product(input)
        .await
        .map_err(commerce_error_to_response)?;
    Ok((StatusCode::CREATED, Json(product)).into_response())
}

#[instrument(skip_all, fields(product_id = %id))]
pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    body: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Response, Response> {
    authz::require(principal.as_deref(), &Permission::CATALOG_WRITE)?;
    let id: ProductId = parse_id(&id, "product")?;
    let Json(input) = body.map_err(json_rejection_to_response)?;

    let product = services
        .catalog
        .update_product(id, input)
        .await
        .map_err(commerce_error_to_response)?;
    Ok(Json(product).into_response())
}

#[instrument(skip_all, fields(product_id = %id))]
pub async fn create_variant(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    body: Result<Json<VariantInput>, JsonRejection>,
) -> Result<Response, Response> {
    authz::require(principal.as_deref(), &Permission::CATALOG_WRITE)?;
    let product_id: ProductId = parse_id(&id, "product")?;
    let Json(input) = body.map_err(json_rejection_to_response)?;

    let variant = services
        .variants
        .create(product_id, input)
        .await
        .map_err(commerce_error_to_response)?;
    Ok((StatusCode::CREATED, Json(variant)).into_response())
}

#[instrument(skip_all, fields(variant_id = %id))]
pub async fn update_variant(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    body: Result<Json<VariantInput>, JsonRejection>,
) -> Result<Response, Response> {
    authz::require(principal.as_deref(), &Permission::CATALOG_WRITE)?;
    let id: VariantId = parse_id(&id, "variant")?;
    let Json(input) = body.map_err(json_rejection_to_response)?;

    let variant = services
        .variants
        .update(id, input)
        .await
        .map_err(commerce_error_to_response)?;
    Ok(Json(variant).into_response())
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    authz::require(principal.as_deref(), &Permission::ORDERS_MANAGE)?;
    let id: OrderId = parse_id(&id, "order")?;

    let order = services.orders.get(id).await.map_err(commerce_error_to_response)?;
    Ok(Json(order).into_response())
}

#[instrument(skip_all, fields(order_id = %id))]
pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
    body: Result<Json<OrderUpdate>, JsonRejection>,
) -> Result<Response, Response> {
    authz::require(principal.as_deref(), &Permission::ORDERS_MANAGE)?;
    let id: OrderId = parse_id(&id, "order")?;
    let Json(update) = body.map_err(json_rejection_to_response)?;

    let order = services
        .orders
        .update(id, update)
        .await
        .map_err(commerce_error_to_response)?;
    Ok(Json(order).into_response())
}

/// Delete an order and put its stock back.
#[instrument(skip_all, fields(order_id = %id))]
pub async fn delete_order(
    Extension(services): Extension<Arc<AppServices>>,
    principal: Option<Extension<PrincipalContext>>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    authz::require(principal.as_deref(), &Permission::ORDERS_MANAGE)?;
    let id: OrderId = parse_id(&id, "order")?;

    let report = services.orders.delete(id).await.map_err(commerce_error_to_response)?;
    Ok(Json(json!({
        "id": report.order.id,
        "orderNumber": report.order.order_number.to_string(),
        "restoredLines": report.restored_lines,
        "failedLines": report.failed_lines,
    }))
    .into_response())
}
