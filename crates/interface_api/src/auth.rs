//! Authentication and authorization
//!
//! Bearer tokens carry the actor (`sub`) and the school they act for
//! (`school_id`). Every ledger call runs in the [`TenantContext`] built from
//! those two claims.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use core_kernel::{SchoolId, TenantContext, UserId};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// School the user acts for
    pub school_id: String,
    /// User's roles
    pub roles: Vec<String>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    /// Builds the tenant context for one request
    pub fn tenant_context(&self, correlation_id: Option<&str>) -> Result<TenantContext, AuthError> {
        let actor = Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)?;
        let school = Uuid::parse_str(&self.school_id).map_err(|_| AuthError::InvalidToken)?;
        let ctx = TenantContext::new(SchoolId::from_uuid(school), UserId::from_uuid(actor));
        Ok(match correlation_id {
            Some(id) => ctx.with_correlation_id(id),
            None => ctx,
        })
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Missing permission: {0}")]
    MissingPermission(String),
}

/// Creates a new JWT token
///
/// # Arguments
///
/// * `user_id` - Acting user
/// * `school_id` - School the token is scoped to
/// * `roles` - User's roles
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(
    user_id: UserId,
    school_id: SchoolId,
    roles: Vec<String>,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.as_uuid().to_string(),
        school_id: school_id.as_uuid().to_string(),
        roles,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Checks if user has required role
pub fn has_role(claims: &Claims, required_role: &str) -> bool {
    claims.roles.iter().any(|r| r == required_role || r == "admin")
}

/// Fails with `MissingPermission` unless the claims carry the role
pub fn require(claims: &Claims, permission: &str) -> Result<(), AuthError> {
    if has_role(claims, permission) {
        Ok(())
    } else {
        Err(AuthError::MissingPermission(permission.to_string()))
    }
}

/// Permission definitions
pub mod permissions {
    pub const BILLING_READ: &str = "billing:read";
    pub const BILLING_WRITE: &str = "billing:write";
    pub const PAYMENT_WRITE: &str = "payment:write";
}
