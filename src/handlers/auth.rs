use crate::{
    auth::{AuthError, AuthUser},
    dto::{AccessTokenResponse, AuthResponse, ProfileResponse, UserResponse},
    errors::{ApiError, ServiceError},
    events::Event,
    handlers::common::{
        created_response, map_service_error, success_response, validate_input, JsonBody,
    },
    services::profile_service::{RegisterInput, UpdateProfileInput},
    AppState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

/// Login request payload
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Logout request payload
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LogoutRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Refresh token request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1))]
    pub refresh: String,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/token/refresh", post(refresh_token))
        .route(
            "/profile",
            get(get_profile).put(update_profile).patch(update_profile),
        )
}

/// Credential failures are reported as a bad request, not an auth challenge.
fn login_error(err: AuthError) -> ApiError {
    match err {
        AuthError::InvalidCredentials | AuthError::AccountDisabled => {
            ApiError::ServiceError(ServiceError::ValidationError(err.to_string()))
        }
        other => other.into(),
    }
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid payload or duplicate username/email", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let account = state
        .services
        .profile
        .register(payload)
        .await
        .map_err(map_service_error)?;
    let tokens = state.auth.issue_tokens(&account).await?;

    Ok(created_response(AuthResponse {
        user: UserResponse::from(&account),
        tokens,
    }))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Bad credentials or disabled account", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let email = payload.email.trim().to_lowercase();
    let account = state
        .auth
        .authenticate(&email, &payload.password)
        .await
        .map_err(login_error)?;
    let tokens = state.auth.issue_tokens(&account).await?;

    info!("User logged in: {}", account.id);
    Ok(success_response(AuthResponse {
        user: UserResponse::from(&account),
        tokens,
    }))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 205, description = "Refresh token revoked"),
        (status = 400, description = "Invalid refresh token", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Auth"
)]
pub async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let invalid = || ApiError::BadRequest {
        message: "Invalid token".to_string(),
    };

    let owner = state
        .auth
        .revoke_refresh_token(&payload.refresh_token)
        .await
        .map_err(|e| match e {
            AuthError::DatabaseError(_) | AuthError::InternalError(_) => ApiError::from(e),
            _ => invalid(),
        })?;
    if owner != user.user_id {
        return Err(invalid());
    }

    state
        .event_sender
        .send_or_log(Event::UserLoggedOut(user.user_id))
        .await;
    Ok(StatusCode::RESET_CONTENT)
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/api/auth/token/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Refresh token revoked or expired", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let access = state.auth.refresh_access_token(&payload.refresh).await?;
    Ok(success_response(AccessTokenResponse { access }))
}

/// The caller's profile
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Auth"
)]
pub async fn get_profile(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .profile
        .get_profile(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(profile))
}

/// Update the caller's profile
#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = UpdateProfileInput,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Role change not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Auth"
)]
pub async fn update_profile(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UpdateProfileInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let profile = state
        .services
        .profile
        .update_profile(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn bad_credentials_become_validation_errors() {
        assert_matches!(
            login_error(AuthError::InvalidCredentials),
            ApiError::ServiceError(ServiceError::ValidationError(msg))
                if msg == "Unable to log in with provided credentials."
        );
        assert_matches!(
            login_error(AuthError::AccountDisabled),
            ApiError::ServiceError(ServiceError::ValidationError(_))
        );
        assert_matches!(
            login_error(AuthError::DatabaseError("down".into())),
            ApiError::ServiceError(ServiceError::InternalError(_))
        );
    }
}
