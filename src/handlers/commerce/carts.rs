use crate::auth::AuthUser;
use crate::dto::{CartItemResponse, CartResponse};
use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
    JsonBody, PathParam,
};
use crate::{
    errors::ApiError,
    services::commerce::cart_service::{AddCartItemInput, UpdateCartItemInput},
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_carts).post(create_cart))
        .route("/:id", get(get_cart).delete(delete_cart))
}

/// Creates the router for cart line endpoints
pub fn cart_items_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cart_items).post(add_cart_item))
        .route(
            "/:id",
            get(get_cart_item)
                .put(update_cart_item)
                .patch(update_cart_item)
                .delete(remove_cart_item),
        )
}

/// The caller's cart, if any
#[utoipa::path(
    get,
    path = "/api/carts",
    responses(
        (status = 200, description = "Zero or one cart", body = [CartResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn list_carts(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let carts = state
        .services
        .cart
        .list_carts(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(carts))
}

/// Get or create the caller's cart
#[utoipa::path(
    post,
    path = "/api/carts",
    responses(
        (status = 201, description = "Cart created", body = CartResponse),
        (status = 200, description = "Existing cart", body = CartResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn create_cart(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let (cart, created) = state
        .services
        .cart
        .get_or_create_cart(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(if created {
        created_response(cart)
    } else {
        success_response(cart)
    })
}

#[utoipa::path(
    get,
    path = "/api/carts/{id}",
    params(("id" = Uuid, Path, description = "Cart id")),
    responses(
        (status = 200, description = "Cart with items", body = CartResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn get_cart(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

#[utoipa::path(
    delete,
    path = "/api/carts/{id}",
    params(("id" = Uuid, Path, description = "Cart id")),
    responses(
        (status = 204, description = "Cart deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn delete_cart(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .cart
        .delete_cart(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/cart-items",
    responses(
        (status = 200, description = "Lines in your cart", body = [CartItemResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn list_cart_items(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .services
        .cart
        .list_items(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(items))
}

/// Add a product to the caller's cart
#[utoipa::path(
    post,
    path = "/api/cart-items",
    request_body = AddCartItemInput,
    responses(
        (status = 201, description = "Line added", body = CartItemResponse),
        (status = 200, description = "Merged into an existing line", body = CartItemResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn add_cart_item(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<AddCartItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let (item, created) = state
        .services
        .cart
        .add_item(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(if created {
        created_response(item)
    } else {
        success_response(item)
    })
}

#[utoipa::path(
    get,
    path = "/api/cart-items/{id}",
    params(("id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Cart line", body = CartItemResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn get_cart_item(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .cart
        .get_item(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    patch,
    path = "/api/cart-items/{id}",
    params(("id" = Uuid, Path, description = "Cart item id")),
    request_body = UpdateCartItemInput,
    responses(
        (status = 200, description = "Cart line updated", body = CartItemResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn update_cart_item(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateCartItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let item = state
        .services
        .cart
        .update_item(user.user_id, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    delete,
    path = "/api/cart-items/{id}",
    params(("id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 204, description = "Cart line removed"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn remove_cart_item(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .cart
        .delete_item(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
