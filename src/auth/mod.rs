/*!
 * # Authentication and Authorization Module
 *
 * Session tokens are HS256 JWTs carrying the account id, username and one
 * primary role. Every protected request passes two checks:
 *
 * - `auth_middleware` verifies the token and re-reads the account, so a lock
 *   applied by an admin takes effect on the very next request.
 * - `role_middleware` checks the token's role against the route's allowed set.
 *
 * Order-level rules (ownership, assignee, status) live in [`permissions`].
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::{ErrorResponse, ServiceError};

// Entity modules
pub mod role;
pub mod user;
pub mod user_role;

// Feature modules
pub mod password;
pub mod permissions;
mod rbac;
mod types;

// Re-exports
pub use rbac::*;
pub use types::*;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i32,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// The caller of a protected route, as established by `auth_middleware`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            token_expiration,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(cfg.jwt_expiration_secs),
        )
    }
}

/// Authentication service that handles token issuance and validation
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Signs a token for the given account and primary role
    pub fn issue_token(&self, id: i32, username: &str, role: Role) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id,
            username: username.to_string(),
            role,
            iat: now,
            exp: now + self.config.token_expiration.as_secs() as i64,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Verifies signature and expiry, then returns the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Token check plus a fresh read of the account's active flag and roles
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;

        let account = user::Entity::find_by_id(claims.id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(user_id = claims.id, "failed to load account for token: {}", e);
                AuthError::DatabaseError(e.to_string())
            })?
            .ok_or(AuthError::UserNotFound)?;

        if !account.is_active {
            warn!(user_id = account.id, "rejecting token of locked account");
            return Err(AuthError::AccountLocked);
        }

        let held = role_names(&*self.db, account.id).await.map_err(|e| {
            error!(user_id = account.id, "failed to load roles for token: {}", e);
            AuthError::DatabaseError(e.to_string())
        })?;
        if !held.iter().any(|name| name == &claims.role.to_string()) {
            warn!(user_id = account.id, role = %claims.role, "token role no longer granted");
            return Err(AuthError::RoleRevoked);
        }

        Ok(AuthUser {
            id: account.id,
            username: account.username,
            role: claims.role,
        })
    }

    /// Verifies credentials and issues a session token.
    ///
    /// Unknown username is 404, wrong password 401, locked account 403. The
    /// password is checked first so the lock state is only revealed to a
    /// caller who knows it.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ServiceError> {
        let db = &*self.db;

        let account = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User does not exist".to_string()))?;

        if !password::verify_password(password, &account.password_hash) {
            warn!(user_id = account.id, "login rejected: wrong password");
            return Err(ServiceError::Unauthorized("Incorrect password".to_string()));
        }

        if !account.is_active {
            warn!(user_id = account.id, "login rejected: account locked");
            return Err(ServiceError::Forbidden(
                "Account is locked. Please contact an administrator".to_string(),
            ));
        }

        let names = role_names(db, account.id).await?;
        let role = primary_role(names.iter().map(String::as_str)).ok_or_else(|| {
            ServiceError::Forbidden("Account has no role assigned".to_string())
        })?;

        let token = self.issue_token(account.id, &account.username, role)?;
        info!(user_id = account.id, %role, "login succeeded");

        Ok(LoginResponse {
            message: "Login successful".to_string(),
            token,
            username: account.username,
            role,
            user_id: account.id,
        })
    }
}

/// Names of every role linked to an account
pub async fn role_names<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Vec<String>, DbErr> {
    role::Entity::find()
        .select_only()
        .column(role::Column::Name)
        .inner_join(user_role::Entity)
        .filter(user_role::Column::UserId.eq(user_id))
        .into_tuple::<String>()
        .all(db)
        .await
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("User not found")]
    UserNotFound,
    #[error("Account is locked")]
    AccountLocked,
    #[error("Role is no longer granted")]
    RoleRevoked,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Token creation failed: {0}")]
    TokenCreation(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::UserNotFound => StatusCode::UNAUTHORIZED,
            Self::InvalidToken
            | Self::TokenExpired
            | Self::AccountLocked
            | Self::RoleRevoked
            | Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn response_message(&self) -> &'static str {
        match self {
            Self::MissingToken => "No authentication token provided",
            Self::InvalidToken | Self::TokenExpired => "Invalid or expired token",
            Self::UserNotFound => "Account no longer exists",
            Self::AccountLocked => "Account is locked",
            Self::RoleRevoked => "Your role has changed; log in again",
            Self::InsufficientPermissions => "You do not have permission to access this resource",
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => {
                "Internal server error"
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "authentication failed");
        }
        let body = ErrorResponse::new(status, self.response_message());
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::UserNotFound => {
                ServiceError::Unauthorized(err.response_message().to_string())
            }
            AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::AccountLocked
            | AuthError::RoleRevoked
            | AuthError::InsufficientPermissions => {
                ServiceError::Forbidden(err.response_message().to_string())
            }
            AuthError::TokenCreation(msg) => ServiceError::JwtError(msg),
            AuthError::DatabaseError(msg) | AuthError::InternalError(msg) => {
                ServiceError::InternalError(msg)
            }
        }
    }
}

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
            .ok_or(AuthError::MissingToken)
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`
fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::MissingToken)
}

/// Authentication middleware that validates the bearer token and the account
pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, AuthError> {
    let auth_service = request
        .extensions()
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or_else(|| AuthError::InternalError("Authentication service not available".into()))?;

    let token = bearer_token(request.headers())?;
    let user = auth_service.authenticate(&token).await?;
    debug!(user_id = user.id, role = %user.role, "request authenticated");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Role middleware: the caller's role must be in the route's allowed set
pub async fn role_middleware(
    State(allowed): State<&'static [Role]>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingToken)?;

    if !is_allowed(user.role, allowed) {
        warn!(user_id = user.id, role = %user.role, "role not allowed for route");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_roles(self, allowed: &'static [Role]) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.route_layer(axum::middleware::from_fn(auth_middleware))
    }

    /// The role check is layered inside authentication, so it runs second.
    fn with_roles(self, allowed: &'static [Role]) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(
            allowed,
            role_middleware,
        ))
        .with_auth()
    }
}
