/*!
 * # Authentication Module
 *
 * JWT access/refresh token pairs signed with HS256. Refresh tokens are
 * persisted by `jti` so logout can revoke them; access tokens are short lived
 * and validated statelessly apart from the account lookup in [`AuthUser`].
 */

use crate::config::AppConfig;
use crate::entities::user_profile;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod password;
pub mod refresh_token;
pub mod user;

pub use password::{hash_password, verify_password};

/// Distinguishes access from refresh tokens so one cannot stand in for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // Subject (user ID)
    pub username: String, // Login name
    pub email: String,
    pub roles: Vec<String>,
    pub jti: String, // JWT ID (unique identifier for this token)
    pub iat: i64,    // Issued at time
    pub exp: i64,    // Expiration time
    pub nbf: i64,    // Not valid before time
    pub iss: String, // Issuer
    pub aud: String, // Audience
    pub token_type: TokenType,
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
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
            Duration::from_secs(cfg.refresh_token_expiration as u64),
        )
    }
}

/// Token pair returned by register and login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication credentials were not provided")]
    MissingAuth,

    #[error("Unable to log in with provided credentials.")]
    InvalidCredentials,

    #[error("User account is disabled.")]
    AccountDisabled,

    #[error("Token is invalid")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<DbErr> for AuthError {
    fn from(err: DbErr) -> Self {
        AuthError::DatabaseError(err.to_string())
    }
}

impl From<AuthError> for crate::errors::ServiceError {
    fn from(err: AuthError) -> Self {
        use crate::errors::ServiceError;
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(_) | AuthError::DatabaseError(_) | AuthError::InternalError(_) => {
                ServiceError::InternalError(err.to_string())
            }
            _ => ServiceError::Unauthorized(err.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        crate::errors::ServiceError::from(self).into_response()
    }
}

/// Authentication service that handles credential checks and token issuance
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.config.jwt_secret.as_bytes())
    }

    fn lifetime(duration: Duration) -> Result<ChronoDuration, AuthError> {
        ChronoDuration::from_std(duration)
            .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))
    }

    fn claims_for(
        &self,
        user: &user::Model,
        roles: Vec<String>,
        token_type: TokenType,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Claims {
        Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            roles,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            token_type,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key())
            .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    async fn roles_for(&self, user_id: Uuid) -> Result<Vec<String>, AuthError> {
        let role = user_profile::Entity::find()
            .filter(user_profile::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .map(|profile| profile.role)
            .unwrap_or_default();
        Ok(vec![role.as_str().to_string()])
    }

    fn access_token_for(
        &self,
        user: &user::Model,
        roles: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let expires_at = now + Self::lifetime(self.config.access_token_expiration)?;
        let claims = self.claims_for(user, roles, TokenType::Access, now, expires_at);
        self.sign(&claims)
    }

    /// Issues an access/refresh pair and records the refresh token.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn issue_tokens(&self, user: &user::Model) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let roles = self.roles_for(user.id).await?;

        let access = self.access_token_for(user, roles.clone(), now)?;

        let refresh_expires_at = now + Self::lifetime(self.config.refresh_token_expiration)?;
        let refresh_claims =
            self.claims_for(user, roles, TokenType::Refresh, now, refresh_expires_at);
        let refresh = self.sign(&refresh_claims)?;

        refresh_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            token_id: Set(refresh_claims.jti.clone()),
            created_at: Set(now),
            expires_at: Set(refresh_expires_at),
            revoked: Set(false),
        }
        .insert(&*self.db)
        .await?;

        debug!("Issued token pair for user {}", user.id);
        Ok(TokenPair { refresh, access })
    }

    /// Decodes and checks signature, expiry, issuer, audience and token type.
    pub fn validate_token(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if claims.token_type != expected {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    /// Verifies email and password; returns the account on success.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<user::Model, AuthError> {
        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?;

        let Some(account) = found else {
            return Err(AuthError::InvalidCredentials);
        };

        let matches = password::verify_password_blocking(
            password.to_string(),
            account.password_hash.clone(),
        )
        .await;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }
        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(account)
    }

    async fn stored_refresh_token(
        &self,
        claims: &Claims,
    ) -> Result<refresh_token::Model, AuthError> {
        let stored = refresh_token::Entity::find()
            .filter(refresh_token::Column::TokenId.eq(claims.jti.as_str()))
            .one(&*self.db)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if stored.revoked {
            return Err(AuthError::RevokedToken);
        }
        if stored.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }
        Ok(stored)
    }

    /// Exchanges a live refresh token for a new access token.
    #[instrument(skip_all)]
    pub async fn refresh_access_token(&self, refresh: &str) -> Result<String, AuthError> {
        let claims = self.validate_token(refresh, TokenType::Refresh)?;
        let stored = self.stored_refresh_token(&claims).await?;

        let account = user::Entity::find_by_id(stored.user_id)
            .one(&*self.db)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let roles = self.roles_for(account.id).await?;
        self.access_token_for(&account, roles, Utc::now())
    }

    /// Blacklists a refresh token. Returns the owning user id.
    #[instrument(skip_all)]
    pub async fn revoke_refresh_token(&self, refresh: &str) -> Result<Uuid, AuthError> {
        let claims = self.validate_token(refresh, TokenType::Refresh)?;
        let stored = self.stored_refresh_token(&claims).await?;
        let user_id = stored.user_id;

        let mut active: refresh_token::ActiveModel = stored.into();
        active.revoked = Set(true);
        active.update(&*self.db).await?;

        info!("Revoked refresh token for user {}", user_id);
        Ok(user_id)
    }
}

/// Authenticated caller resolved from the bearer access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub token_id: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn resolve_user(auth: &AuthService, token: &str) -> Result<AuthUser, AuthError> {
    let claims = auth.validate_token(token, TokenType::Access)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    let account = user::Entity::find_by_id(user_id)
        .one(&*auth.db)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    if !account.is_active {
        return Err(AuthError::AccountDisabled);
    }

    Ok(AuthUser {
        user_id,
        username: account.username,
        email: account.email,
        roles: claims.roles,
        token_id: claims.jti,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(parts).ok_or(AuthError::MissingAuth)?;
        resolve_user(&auth, token).await
    }
}

/// Caller identity for endpoints that are public but personalize output.
///
/// No `Authorization` header yields `None`; a present but invalid token is rejected.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl OptionalAuthUser {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|u| u.user_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(OptionalAuthUser(None));
        }
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(parts).ok_or(AuthError::InvalidToken)?;
        resolve_user(&auth, token).await.map(|u| OptionalAuthUser(Some(u)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        // Token signing and validation never touch the database.
        let db = DatabaseConnection::default();
        AuthService::new(
            AuthConfig::new(
                "unit_test_signing_key_with_enough_entropy_0123456789".into(),
                "wearup-clients".into(),
                "wearup-api".into(),
                Duration::from_secs(600),
                Duration::from_secs(3600),
            ),
            Arc::new(db),
        )
    }

    fn account() -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trips_claims() {
        let svc = service();
        let user = account();
        let token = svc
            .access_token_for(&user, vec!["buyer".into()], Utc::now())
            .unwrap();
        let claims = svc.validate_token(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, vec!["buyer".to_string()]);
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let svc = service();
        let token = svc.access_token_for(&account(), vec![], Utc::now()).unwrap();
        assert!(matches!(
            svc.validate_token(&token, TokenType::Refresh),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service();
        let issued = Utc::now() - ChronoDuration::hours(2);
        let token = svc.access_token_for(&account(), vec![], issued).unwrap();
        assert!(matches!(
            svc.validate_token(&token, TokenType::Access),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn token_from_other_issuer_is_rejected() {
        let svc = service();
        let mut other = svc.clone();
        other.config.jwt_issuer = "someone-else".into();
        let token = other.access_token_for(&account(), vec![], Utc::now()).unwrap();
        assert!(svc.validate_token(&token, TokenType::Access).is_err());
    }

    #[test]
    fn auth_errors_map_to_status_classes() {
        use axum::http::StatusCode;
        let status = |e: AuthError| crate::errors::ServiceError::from(e).status_code();
        assert_eq!(status(AuthError::MissingAuth), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::RevokedToken), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(AuthError::InsufficientPermissions),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(AuthError::InternalError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
