//! Authenticated principal, read from headers set by the session layer.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::CartId;
use domain::{Purchaser, Role};

use crate::error::ApiError;

pub const EMAIL_HEADER: &str = "x-user-email";
pub const ROLE_HEADER: &str = "x-user-role";
pub const CART_HEADER: &str = "x-user-cart";
pub const NAME_HEADER: &str = "x-user-name";

/// The caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub role: Role,
    /// The principal's own cart, if the session carries one.
    pub cart_id: Option<CartId>,
    pub name: Option<String>,
}

impl Principal {
    /// Fails with 403 unless the principal has one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            tracing::debug!(email = %self.email, role = %self.role, "role rejected");
            Err(ApiError::Forbidden(format!(
                "Role '{}' is not allowed here",
                self.role
            )))
        }
    }

    /// Admins reach every cart; everyone else only their own.
    pub fn require_cart_access(&self, cart_id: CartId) -> Result<(), ApiError> {
        if self.role.is_admin() || self.cart_id == Some(cart_id) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Cart {cart_id} does not belong to {}",
                self.email
            )))
        }
    }

    pub fn purchaser(&self) -> Purchaser {
        let purchaser = Purchaser::new(self.email.clone());
        match &self.name {
            Some(name) => purchaser.with_name(name.clone()),
            None => purchaser,
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let email = header(parts, EMAIL_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?
            .to_string();

        let role = match header(parts, ROLE_HEADER) {
            Some(raw) => raw
                .parse::<Role>()
                .map_err(ApiError::Forbidden)?,
            None => Role::User,
        };

        let cart_id = header(parts, CART_HEADER)
            .map(|raw| {
                raw.parse::<CartId>()
                    .map_err(|e| ApiError::BadRequest(format!("Invalid {CART_HEADER}: {e}")))
            })
            .transpose()?;

        Ok(Self {
            email,
            role,
            cart_id,
            name: header(parts, NAME_HEADER).map(str::to_string),
        })
    }
}
