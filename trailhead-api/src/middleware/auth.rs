use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use trailhead_core::CoreError;

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_GUEST: &str = "GUEST";
pub const ROLE_CUSTOMER: &str = "CUSTOMER";
pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_VALIDATOR: &str = "VALIDATOR";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn can_validate(&self) -> bool {
        self.role == ROLE_VALIDATOR || self.is_admin()
    }

    /// Owners and admins only.
    pub fn ensure_owner(&self, owner_id: &str) -> Result<(), CoreError> {
        if self.sub == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(CoreError::Forbidden("Access denied to this booking".to_string()))
        }
    }
}

pub fn issue_token(secret: &str, subject: &str, role: &str, ttl_seconds: u64) -> Result<String, AppError> {
    let ttl = i64::try_from(ttl_seconds).map_err(CoreError::internal)?;
    let claims = Claims {
        sub: subject.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::seconds(ttl)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| CoreError::internal(format!("Token encoding failed: {}", e)).into())
}

fn authenticate(state: &AppState, req: &Request) -> Result<Claims, AppError> {
    // 1. Extract token from Authorization header
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    // 2. Decode and validate JWT
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(e.to_string()))
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Any valid token; claims are injected into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;
    if !claims.is_admin() {
        return Err(CoreError::Forbidden("Admin role required".to_string()).into());
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
