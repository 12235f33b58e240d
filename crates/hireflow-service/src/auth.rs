//! Authentication extractors.
//!
//! - `AuthUser`: recruiter requests, HS256 JWT carrying user and organization
//! - `ServiceAuth`: service-to-service requests (CV ingestion) via API key
//! - `AdminAuth`: privileged endpoints via admin key

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use hireflow_core::{OrganizationId, UserId};

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated recruiter.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
    /// The organization the session is scoped to.
    pub organization_id: OrganizationId,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        // Never compiled into production builds.
        #[cfg(any(test, feature = "test-auth"))]
        if let Some(rest) = token.strip_prefix("test-token:") {
            let (user, org) = rest.split_once(':').ok_or(ApiError::Unauthorized)?;
            return Ok(Self {
                user_id: user.parse().map_err(|_| ApiError::Unauthorized)?,
                organization_id: org.parse().map_err(|_| ApiError::Unauthorized)?,
            });
        }

        let claims = validate_jwt(token, state)?;
        Ok(Self {
            user_id: claims.sub.parse().map_err(|_| ApiError::Unauthorized)?,
            organization_id: claims.org.parse().map_err(|_| ApiError::Unauthorized)?,
        })
    }
}

/// Service authentication via API key.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The calling service, from `X-Service-Name`.
    pub service_name: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        check_key(parts, "x-api-key", state.config.service_api_key.as_deref())?;

        let service_name = header(parts, "x-service-name")
            .unwrap_or("unknown")
            .to_string();
        Ok(Self { service_name })
    }
}

/// Admin authentication via `X-Admin-Key`.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        check_key(parts, "x-admin-key", state.config.admin_api_key.as_deref())?;

        let admin_id = header(parts, "x-admin-id").unwrap_or("admin").to_string();
        tracing::info!(admin_id = %admin_id, "Admin authenticated");
        Ok(Self { admin_id })
    }
}

/// JWT claims issued by the session service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Organization ID.
    pub org: String,
    /// Audience.
    #[serde(default)]
    pub aud: Option<String>,
    /// Expiration time.
    pub exp: i64,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// An unconfigured key rejects every request.
fn check_key(parts: &Parts, name: &str, expected: Option<&str>) -> Result<(), ApiError> {
    let provided = header(parts, name).ok_or(ApiError::Unauthorized)?;
    let expected = expected.ok_or(ApiError::Unauthorized)?;
    if constant_time_eq(provided, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let Some(secret) = state.config.auth_jwt_secret.as_deref() else {
        tracing::warn!("AUTH_JWT_SECRET not configured - rejecting bearer token");
        return Err(ApiError::Unauthorized);
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[&state.config.auth_audience]);

    decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use hireflow_store::MemoryStore;

    use crate::config::ServiceConfig;

    fn state() -> AppState {
        AppState::new(
            Arc::new(MemoryStore::new()),
            ServiceConfig {
                auth_jwt_secret: Some("jwt-secret".into()),
                ..ServiceConfig::default()
            },
        )
    }

    fn token(secret: &str, aud: &str, exp: i64) -> (String, UserId, OrganizationId) {
        let user = UserId::generate();
        let org = OrganizationId::generate();
        let claims = JwtClaims {
            sub: user.to_string(),
            org: org.to_string(),
            aud: Some(aud.into()),
            exp,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (token, user, org)
    }

    fn future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn valid_jwt_yields_claims() {
        let state = state();
        let (token, user, org) = token("jwt-secret", "hireflow", future());
        let claims = validate_jwt(&token, &state).unwrap();
        assert_eq!(claims.sub, user.to_string());
        assert_eq!(claims.org, org.to_string());
    }

    #[test]
    fn wrong_secret_audience_or_expiry_is_rejected() {
        let state = state();
        let (bad_secret, ..) = token("other", "hireflow", future());
        let (bad_aud, ..) = token("jwt-secret", "elsewhere", future());
        let (expired, ..) = token("jwt-secret", "hireflow", 1_000);

        for t in [bad_secret, bad_aud, expired] {
            assert!(matches!(validate_jwt(&t, &state), Err(ApiError::Unauthorized)));
        }
    }

    #[test]
    fn missing_secret_rejects_everything() {
        let state = AppState::new(Arc::new(MemoryStore::new()), ServiceConfig::default());
        let (t, ..) = token("jwt-secret", "hireflow", future());
        assert!(validate_jwt(&t, &state).is_err());
    }
}
