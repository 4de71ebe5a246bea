use bazaar_core::UserId;

use crate::{JwtClaims, Permission, Role};

/// An authenticated shopper or operator, resolved from validated claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: Option<String>,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email.clone(),
            roles: claims.roles.clone(),
            permissions: permissions_from_roles(&claims.roles),
        }
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == name)
    }
}

/// Static role → permission mapping. `admin` grants everything; shoppers
/// need no extra permissions for their own cart and orders.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == "admin") {
        return vec![Permission::WILDCARD];
    }
    Vec::new()
}
