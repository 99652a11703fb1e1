//! Role-based access: which role may do what, and the bearer-token gate that
//! resolves a request's caller before any data is touched.

use thiserror::Error;

use crate::auth::IdentityProvider;
use crate::models::Role;
use crate::storage::{Storage, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageProducts,
    ManageUsers,
    ManageInventory,
    RunScanner,
    AssignSuperadmin,
}

impl Role {
    pub fn allows(self, capability: Capability) -> bool {
        use Capability::*;
        match (self, capability) {
            (Role::Superadmin, _) => true,
            (Role::Admin, AssignSuperadmin) => false,
            (Role::Admin, _) => true,
            (Role::User, ManageInventory | RunScanner) => true,
            (Role::User, _) => false,
        }
    }
}

/// The authenticated, registered identity behind a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub uid: String,
    pub email: String,
    pub role: Role,
    /// Raw bearer token, forwarded to the scanner process.
    pub token: String,
}

impl Caller {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.allows(capability)
    }
}

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User not registered")]
    NotRegistered,

    #[error("Forbidden: Insufficient permissions")]
    Forbidden,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Token check, then role lookup, then capability check, in that order.
pub fn authorize(
    identity: &IdentityProvider,
    storage: &Storage,
    authorization: Option<&str>,
    capability: Capability,
) -> Result<Caller, GateError> {
    let token = bearer_token(authorization).ok_or(GateError::MissingToken)?;
    let claims = identity
        .verify_token(token)
        .map_err(|_| GateError::InvalidToken)?;

    let user = storage
        .get_user(&claims.sub)?
        .ok_or(GateError::NotRegistered)?;

    if !user.role.allows(capability) {
        return Err(GateError::Forbidden);
    }

    Ok(Caller {
        uid: claims.sub,
        email: user.email,
        role: user.role,
        token: token.to_string(),
    })
}
