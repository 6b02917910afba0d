//! Supabase access token authentication.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Audience Supabase puts on tokens of signed-in users.
const SUPABASE_AUDIENCE: &str = "authenticated";

/// Decoded Supabase access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    /// User ID
    pub sub: String,
    /// Email (if available)
    #[serde(default)]
    pub email: Option<String>,
    /// Postgres role the token grants
    #[serde(default)]
    pub role: Option<String>,
    /// Audience
    pub aud: String,
    /// Expiration
    pub exp: i64,
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl From<SupabaseClaims> for AuthUser {
    fn from(claims: SupabaseClaims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Verifies HS256 tokens signed with the project's JWT secret.
pub struct JwtVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtVerifier {
    /// Build a verifier. Without a secret every token is rejected.
    pub fn from_secret(secret: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        Self {
            key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation,
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<SupabaseClaims, ApiError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| ApiError::unauthorized("Authentication is not configured"))?;

        let token_data = decode::<SupabaseClaims>(token, key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            ApiError::unauthorized(format!("Token validation failed: {}", e))
        })?;

        if token_data.claims.sub.is_empty() {
            return Err(ApiError::unauthorized("Token has no subject"));
        }

        Ok(token_data.claims)
    }
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let claims = state.auth.verify_token(token.trim())?;

        Ok(AuthUser::from(claims))
    }
}
