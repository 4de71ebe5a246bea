use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    response::{IntoResponse, Response},
};

use crate::app::errors::commerce_error_to_response;
use crate::app::services::AppServices;

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
) -> Result<Response, Response> {
    let page = services
        .catalog
        .product_page(&slug)
        .await
        .map_err(commerce_error_to_response)?;
    Ok(Json(page).into_response())
}
