//! API-side authorization guard for admin routes.
//!
//! Services stay auth-agnostic; handlers call [`require`] before touching
//! them.

use axum::http::StatusCode;
use axum::response::Response;

use bazaar_auth::{Permission, authorize};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

/// Check that the request is authenticated and holds `permission`.
///
/// Anonymous requests get 401, authenticated ones lacking the permission 403.
pub fn require(
    principal: Option<&PrincipalContext>,
    permission: &Permission,
) -> Result<(), Response> {
    let Some(principal) = principal else {
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "authentication required",
        ));
    };

    authorize(principal.principal(), permission)
        .map_err(|e| json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

/// Like [`require`] but only checks that someone is signed in.
pub fn require_user(principal: Option<&PrincipalContext>) -> Result<&PrincipalContext, Response> {
    principal.ok_or_else(|| {
        json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "authentication required",
        )
    })
}
