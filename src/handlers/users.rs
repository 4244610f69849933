use crate::{
    dto::PublicProfileResponse,
    errors::ApiError,
    handlers::common::{map_service_error, success_response, PathParam},
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/:id", get(get_user))
}

/// Public profile of a user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = PublicProfileResponse),
        (status = 404, description = "No such user", body = crate::errors::ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .profile
        .public_profile(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(profile))
}
