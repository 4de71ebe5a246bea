//! `bazaar-auth`: identity boundary.
//!
//! Decoupled from HTTP and storage: turns a bearer token into a validated
//! [`Principal`] and answers permission checks. A request without a token is
//! simply anonymous; the API layer decides which routes need an identity.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod validator;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
pub use validator::{Hs256JwtValidator, JwtValidator};
