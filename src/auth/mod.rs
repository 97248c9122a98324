/*!
 * # Authentication and Authorization Module
 *
 * JWT access/refresh tokens for phone+password logins, argon2 password
 * hashing and numeric one-time codes. Role checks are applied per router
 * through [`AuthRouterExt`].
 */

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::account::{self, AccountRole};
use crate::errors::ServiceError;

pub mod otp;
pub mod password;

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Account ID
    pub name: Option<String>,  // Display name
    pub phone: Option<String>, // Login phone
    pub roles: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
    pub token_type: String,
}

/// Authenticated account extracted from the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub roles: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(Self {
            user_id,
            name: claims.name,
            phone: claims.phone,
            roles: claims.roles,
            token_id: claims.jti,
        })
    }
}

/// Type alias used by handler signatures
pub type AuthenticatedUser = AuthUser;

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        access_token_expiration: Duration,
        refresh_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration,
            refresh_token_expiration,
        }
    }

    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
            Duration::from_secs(cfg.refresh_token_expiration as u64),
        )
    }
}

/// Issues and validates JWTs
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    fn claims_for(
        &self,
        account: &account::Model,
        token_type: &str,
        lifetime: Duration,
    ) -> Result<Claims, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(lifetime)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        // Refresh tokens carry the subject only
        let (name, phone, roles) = if token_type == ACCESS_TOKEN_TYPE {
            (
                Some(account.name.clone()),
                Some(account.phone.clone()),
                vec![account.role.as_str().to_string()],
            )
        } else {
            (None, None, vec![])
        };

        Ok(Claims {
            sub: account.id.to_string(),
            name,
            phone,
            roles,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            token_type: token_type.to_string(),
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Generate an access/refresh pair for an account
    pub fn generate_token(&self, account: &account::Model) -> Result<TokenPair, AuthError> {
        let access_claims = self.claims_for(
            account,
            ACCESS_TOKEN_TYPE,
            self.config.access_token_expiration,
        )?;
        let refresh_claims = self.claims_for(
            account,
            REFRESH_TOKEN_TYPE,
            self.config.refresh_token_expiration,
        )?;

        debug!(account_id = %account.id, "issued token pair");

        Ok(TokenPair {
            access_token: self.encode_claims(&access_claims)?,
            refresh_token: self.encode_claims(&refresh_claims)?,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
        })
    }

    /// Validate a JWT and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    fn validate_typed(&self, token: &str, token_type: &str) -> Result<Claims, AuthError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != token_type {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.validate_typed(token, ACCESS_TOKEN_TYPE)
    }

    /// Returns the account id the refresh token was issued to
    pub fn validate_refresh_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.validate_typed(token, REFRESH_TOKEN_TYPE)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
    }
}

/// Token pair response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                msg.clone(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) => ServiceError::JwtError(msg),
            AuthError::InternalError(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(&required_role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Passes when the user holds at least one of the listed roles
pub async fn any_role_middleware(
    State(roles): State<Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !roles.iter().any(|role| user.has_role(role)) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(request.headers(), &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::MissingAuth)?;

    let claims = auth_service.validate_access_token(token)?;
    AuthUser::from_claims(claims)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: AccountRole) -> Self;
    fn with_any_role(self, roles: &[AccountRole]) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: AccountRole) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.as_str().to_string(),
            role_middleware,
        ))
        .with_auth()
    }

    fn with_any_role(self, roles: &[AccountRole]) -> Self {
        let roles: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
        self.layer(axum::middleware::from_fn_with_state(
            Arc::new(roles),
            any_role_middleware,
        ))
        .with_auth()
    }
}

/// Injects the shared [`AuthService`] into request extensions so
/// [`auth_middleware`] can find it.
pub async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service(access_secs: u64) -> AuthService {
        AuthService::new(AuthConfig::new(
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "quickcommerce-api".to_string(),
            "quickcommerce-auth".to_string(),
            Duration::from_secs(access_secs),
            Duration::from_secs(3600),
        ))
    }

    fn account(role: AccountRole) -> account::Model {
        account::Model {
            id: Uuid::new_v4(),
            role,
            name: "Asha".to_string(),
            email: None,
            phone: "+919800000001".to_string(),
            password_hash: String::new(),
            dob: None,
            gender: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trips_role_and_subject() {
        let svc = service(600);
        let acct = account(AccountRole::Driver);
        let pair = svc.generate_token(&acct).unwrap();

        let claims = svc.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, acct.id.to_string());
        assert_eq!(claims.roles, vec!["driver".to_string()]);
        assert_eq!(pair.token_type, "Bearer");
    }

    #[test]
    fn refresh_token_is_not_accepted_as_access_token() {
        let svc = service(600);
        let pair = svc.generate_token(&account(AccountRole::Customer)).unwrap();

        assert_matches!(
            svc.validate_access_token(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        );
        assert!(svc.validate_refresh_token(&pair.refresh_token).is_ok());
        assert_matches!(
            svc.validate_refresh_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let svc = service(600);
        let mut other = service(600);
        other.config.jwt_secret = "another_secret_key_that_is_long_enough_123".to_string();
        let pair = other.generate_token(&account(AccountRole::Admin)).unwrap();

        assert_matches!(
            svc.validate_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn auth_error_maps_into_service_error() {
        assert_matches!(
            ServiceError::from(AuthError::InsufficientPermissions),
            ServiceError::Forbidden(_)
        );
        assert_matches!(
            ServiceError::from(AuthError::TokenExpired),
            ServiceError::Unauthorized(_)
        );
    }
}
