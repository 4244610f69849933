use crate::{
    auth::{AuthUser, OptionalAuthUser},
    dto::{
        CommentResponse, LikeResponse, LikeToggleResponse, ShareRecordResponse, ShareResponse,
    },
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, no_content_response, success_response,
        validate_input, JsonBody, PathParam, QueryParams,
    },
    services::social_service::{
        CreateCommentInput, CreateLikeInput, CreateShareInput, ShareInput, UpdateCommentInput,
    },
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

/// Like and share actions nested under `/products/:id`.
pub fn product_action_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/toggle-like", post(toggle_like))
        .route("/:id/share", post(share_product))
}

pub fn like_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_likes).post(create_like))
        .route("/:id", delete(delete_like))
}

pub fn comment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route(
            "/:id",
            get(get_comment)
                .put(update_comment)
                .patch(update_comment)
                .delete(delete_comment),
        )
}

pub fn share_routes() -> Router<AppState> {
    Router::new().route("/", get(list_shares).post(create_share))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CommentListParams {
    /// Product whose comment threads to list; omit for your own comments
    pub product: Option<Uuid>,
}

/// Like or unlike a product
#[utoipa::path(
    post,
    path = "/api/products/{id}/toggle-like",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "New like state", body = LikeToggleResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such product", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn toggle_like(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .social
        .toggle_like(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(result))
}

/// Record a share of a product
#[utoipa::path(
    post,
    path = "/api/products/{id}/share",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = ShareInput,
    responses(
        (status = 200, description = "Share recorded", body = ShareResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such product", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn share_product(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    payload: Option<JsonBody<ShareInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|JsonBody(p)| p).unwrap_or_default();
    validate_input(&payload)?;
    let result = state
        .services
        .social
        .share_product(user.user_id, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(result))
}

#[utoipa::path(
    get,
    path = "/api/product-likes",
    responses(
        (status = 200, description = "Your likes", body = [LikeResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn list_likes(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let likes = state
        .services
        .social
        .list_likes(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(likes))
}

#[utoipa::path(
    post,
    path = "/api/product-likes",
    request_body = CreateLikeInput,
    responses(
        (status = 201, description = "Liked", body = LikeResponse),
        (status = 400, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already liked", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn create_like(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateLikeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let like = state
        .services
        .social
        .create_like(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(like))
}

#[utoipa::path(
    delete,
    path = "/api/product-likes/{id}",
    params(("id" = Uuid, Path, description = "Like id")),
    responses(
        (status = 204, description = "Like removed"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn delete_like(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .social
        .delete_like(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Comment threads of a product, or your own comments
#[utoipa::path(
    get,
    path = "/api/product-comments",
    params(CommentListParams),
    responses(
        (status = 200, description = "Comments with one level of replies", body = [CommentResponse]),
        (status = 401, description = "`product` omitted without authentication", body = crate::errors::ErrorResponse)
    ),
    tag = "Social"
)]
pub async fn list_comments(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    QueryParams(params): QueryParams<CommentListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let social = &state.services.social;
    let comments = match (params.product, viewer.user_id()) {
        (Some(product), _) => social.product_comments(product).await,
        (None, Some(user_id)) => social.own_comments(user_id).await,
        (None, None) => return Err(ApiError::Unauthorized),
    }
    .map_err(map_service_error)?;
    Ok(success_response(comments))
}

#[utoipa::path(
    get,
    path = "/api/product-comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment", body = CommentResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Social"
)]
pub async fn get_comment(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .services
        .social
        .get_comment(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(comment))
}

#[utoipa::path(
    post,
    path = "/api/product-comments",
    request_body = CreateCommentInput,
    responses(
        (status = 201, description = "Comment posted", body = CommentResponse),
        (status = 400, description = "Invalid payload or parent", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn create_comment(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let comment = state
        .services
        .social
        .create_comment(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(comment))
}

#[utoipa::path(
    put,
    path = "/api/product-comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    request_body = UpdateCommentInput,
    responses(
        (status = 200, description = "Comment updated", body = CommentResponse),
        (status = 403, description = "Not the author", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn update_comment(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let comment = state
        .services
        .social
        .update_comment(user.user_id, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(comment))
}

#[utoipa::path(
    delete,
    path = "/api/product-comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Comment deleted with its replies"),
        (status = 403, description = "Not the author", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .social
        .delete_comment(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/product-shares",
    responses(
        (status = 200, description = "Your shares", body = [ShareRecordResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn list_shares(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let shares = state
        .services
        .social
        .list_shares(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(shares))
}

#[utoipa::path(
    post,
    path = "/api/product-shares",
    request_body = CreateShareInput,
    responses(
        (status = 201, description = "Share recorded", body = ShareRecordResponse),
        (status = 400, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Social"
)]
pub async fn create_share(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateShareInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let share = state
        .services
        .social
        .create_share(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(share))
}
