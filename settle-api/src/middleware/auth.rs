use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use settle_core::RequesterIdentity;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

impl Claims {
    pub fn into_identity(self, admin_role: &str) -> RequesterIdentity {
        let is_elevated = self.roles.iter().any(|role| role == admin_role);
        RequesterIdentity { subject: self.sub, is_elevated }
    }
}

// ============================================================================
// Authentication Middleware
// ============================================================================

/// Resolve the bearer token into a `RequesterIdentity` request extension
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. Extract token from Authorization header
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Authentication("Missing bearer token".to_string()))?;

    // 2. Decode and validate JWT
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        AppError::Authentication("Invalid token".to_string())
    })?;

    // 3. Inject identity into request extensions
    let identity = token_data.claims.into_identity(&state.auth.admin_role);
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_role_elevates() {
        let claims = Claims { sub: "ops".into(), roles: vec!["payment_admin".into()], exp: 0 };
        assert!(claims.into_identity("payment_admin").is_elevated);

        let claims = Claims { sub: "u1".into(), roles: vec!["customer".into()], exp: 0 };
        let identity = claims.into_identity("payment_admin");
        assert!(!identity.is_elevated);
        assert_eq!(identity.subject, "u1");
    }
}
