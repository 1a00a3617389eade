//! Authentication middleware
//!
//! Verifies access tokens issued by the auth provider, loads the caller's
//! roles, and provides the role and ownership guards used by handlers.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use shared::models::{CallerRoles, Operation};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::services::ProfileService;
use crate::AppState;

/// Authenticated caller, inserted into request extensions
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub roles: CallerRoles,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.roles.is_admin
    }

    pub fn is_farmer(&self) -> bool {
        self.roles.is_farmer()
    }
}

/// JWT claims issued by the auth provider
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Decode and validate an HS256 access token
pub fn decode_jwt(token: &str, secret: &str, audience: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        })
}

/// Authentication middleware that validates bearer tokens
///
/// Rejects the request before any handler runs when the token is missing,
/// malformed, expired, or issued for another audience.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = match request.headers().typed_get::<Authorization<Bearer>>() {
        Some(Authorization(bearer)) => bearer,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let claims = match decode_jwt(
        bearer.token(),
        &state.config.jwt.secret,
        &state.config.jwt.audience,
    ) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    let roles = match ProfileService::new(state.db.clone()).caller_roles(user_id).await {
        Ok(roles) => roles,
        Err(err) => return err.into_response(),
    };

    tracing::debug!(
        user_id = %user_id,
        profile_role = ?roles.profile_role,
        is_admin = roles.is_admin,
        "Authenticated request"
    );

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email,
        roles,
    });

    next.run(request).await
}

/// Route layer for admin-only groups; must run after `auth_middleware`
pub async fn admin_middleware(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => next.run(request).await,
        Some(user) => {
            tracing::warn!(user_id = %user.user_id, "Non-admin attempted admin route");
            forbidden_response("Administrator role required")
        }
        None => unauthorized_response("Authentication required"),
    }
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message, "No autorizado"),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Create forbidden response
fn forbidden_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("FORBIDDEN", message, "Acceso denegado"),
    };

    (StatusCode::FORBIDDEN, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail::new(
                        "UNAUTHORIZED",
                        "Authentication required",
                        "Debes iniciar sesión",
                    ),
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Role guard for a named operation
pub fn require(user: &AuthUser, operation: Operation) -> AppResult<()> {
    if user.roles.can(operation) {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.user_id, operation = ?operation, "Permission denied");
        Err(AppError::InsufficientPermissions)
    }
}

/// Caller must have the farmer profile role
pub fn require_farmer(user: &AuthUser) -> AppResult<()> {
    if user.is_farmer() {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "Only farmers can perform this action",
            "Solo los agricultores pueden realizar esta acción",
        ))
    }
}

/// Caller must hold the admin role
pub fn require_admin(user: &AuthUser) -> AppResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "Administrator role required",
            "Se requiere rol de administrador",
        ))
    }
}

/// Caller must own the resource
pub fn require_owner(user: &AuthUser, owner_id: Uuid, resource: &str) -> AppResult<()> {
    if user.user_id == owner_id {
        Ok(())
    } else {
        Err(AppError::forbidden(
            format!("{} not found or not authorized", resource),
            "Recurso no encontrado o no autorizado",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use shared::models::ProfileRole;

    const SECRET: &str = "test-secret";

    fn token(aud: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: Uuid::from_u128(7).to_string(),
            email: Some("farmer@example.com".to_string()),
            aud: aud.to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn user(profile_role: Option<ProfileRole>, is_admin: bool) -> AuthUser {
        AuthUser {
            user_id: Uuid::from_u128(7),
            email: None,
            roles: CallerRoles {
                profile_role,
                is_admin,
            },
        }
    }

    #[test]
    fn test_decode_valid_token() {
        let claims = decode_jwt(&token("authenticated", 3600), SECRET, "authenticated").unwrap();
        assert_eq!(claims.sub, Uuid::from_u128(7).to_string());
        assert_eq!(claims.email.as_deref(), Some("farmer@example.com"));
    }

    #[test]
    fn test_decode_rejects_wrong_audience_and_secret() {
        assert!(matches!(
            decode_jwt(&token("anon", 3600), SECRET, "authenticated"),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            decode_jwt(&token("authenticated", 3600), "other", "authenticated"),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            decode_jwt("not-a-jwt", SECRET, "authenticated"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_decode_expired_token() {
        assert!(matches!(
            decode_jwt(&token("authenticated", -3600), SECRET, "authenticated"),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn test_guards() {
        let farmer = user(Some(ProfileRole::Farmer), false);
        let researcher = user(Some(ProfileRole::Researcher), false);
        let admin = user(None, true);

        assert!(require_farmer(&farmer).is_ok());
        assert!(require_farmer(&researcher).is_err());
        assert!(require_admin(&admin).is_ok());
        assert!(require_admin(&farmer).is_err());
        assert!(require(&farmer, Operation::CreateContribution).is_ok());
        assert!(require(&admin, Operation::CreateContribution).is_err());
        assert!(require(&admin, Operation::VerifyContribution).is_ok());
    }

    #[test]
    fn test_foreign_resource_is_forbidden() {
        let farmer = user(Some(ProfileRole::Farmer), false);

        assert!(require_owner(&farmer, Uuid::from_u128(7), "Farm location").is_ok());

        let err = require_owner(&farmer, Uuid::from_u128(8), "Farm location").unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
