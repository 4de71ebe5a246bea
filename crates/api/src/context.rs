use bazaar_auth::{Principal, Role};
use bazaar_core::UserId;
use bazaar_infra::services::Shopper;

/// Authenticated identity of a request.
///
/// Only present when the request carried a valid bearer token; anonymous
/// shoppers have no principal context and use the guest cart cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn shopper(&self) -> Shopper {
        Shopper {
            user_id: self.principal.user_id,
            email: self.principal.email.clone(),
        }
    }
}
