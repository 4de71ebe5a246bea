use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use bazaar_infra::CommerceError;

pub fn commerce_error_to_response(err: CommerceError) -> axum::response::Response {
    match err {
        CommerceError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        CommerceError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        CommerceError::Unavailable(u) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "product_unavailable",
                "message": u.message(),
                "scope": u.scope,
                "reason": u.reason,
            })),
        )
            .into_response(),
        CommerceError::InsufficientStock {
            message,
            available_quantity,
            current_in_cart,
            available_to_add,
        } => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "availableQuantity": available_quantity,
                "currentInCart": current_in_cart,
                "availableToAdd": available_to_add,
            })),
        )
            .into_response(),
        CommerceError::EmptyCart => {
            json_error(StatusCode::BAD_REQUEST, "empty_cart", "cart is empty")
        }
        CommerceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        CommerceError::Internal(detail) => {
            error!(error = %detail, "request failed with internal error");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error",
            )
        }
    }
}

/// Malformed JSON bodies are client errors, whatever stage of parsing failed.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
{
    raw.parse::<T>().map_err(|_| {
        json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
    })
}

#[cfg(test)]
mod tests {
    use bazaar_catalog::Unavailable;

    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (CommerceError::validation("bad"), StatusCode::BAD_REQUEST),
            (CommerceError::not_found("product"), StatusCode::NOT_FOUND),
            (Unavailable::all_variants().into(), StatusCode::BAD_REQUEST),
            (CommerceError::insufficient_stock(2, 1), StatusCode::BAD_REQUEST),
            (CommerceError::EmptyCart, StatusCode::BAD_REQUEST),
            (CommerceError::Conflict("sku".into()), StatusCode::CONFLICT),
            (CommerceError::Internal("db down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(commerce_error_to_response(err).status(), status);
        }
    }
}
