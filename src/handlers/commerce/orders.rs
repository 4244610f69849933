use crate::auth::AuthUser;
use crate::dto::{OrderItemResponse, OrderResponse};
use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
    JsonBody, PaginatedResponse, PaginationParams, PathParam, QueryParams,
};
use crate::{
    errors::ApiError,
    services::commerce::order_service::{
        CheckoutInput, CreateOrderInput, CreateOrderItemInput, OrderListQuery, UpdateOrderInput,
    },
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/checkout", post(checkout))
        .route(
            "/:id",
            get(get_order)
                .put(update_order)
                .patch(update_order)
                .delete(delete_order),
        )
}

/// Creates the router for order line endpoints
pub fn order_items_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_order_items).post(create_order_item))
        .route("/:id", get(get_order_item))
}

/// The caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Page of orders", body = PaginatedResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    user: AuthUser,
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.page();
    let per_page = state.config.page_size(params.per_page);
    let (orders, total) = state
        .services
        .order
        .list_orders(user.user_id, OrderListQuery { page, per_page })
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        orders, page, per_page, total,
    )))
}

/// Place an order with client-supplied totals
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Invalid payload or address", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .order
        .create_order(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(order))
}

/// Turn the caller's cart into an order
#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    request_body = CheckoutInput,
    responses(
        (status = 201, description = "Order placed", body = OrderResponse),
        (status = 400, description = "Empty cart, bad address or unusable coupon", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Option<JsonBody<CheckoutInput>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|JsonBody(p)| p).unwrap_or_default();
    validate_input(&payload)?;
    let order = state
        .services
        .order
        .checkout(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = OrderResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .get_order(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Update status, payment status, tracking number or notes
#[utoipa::path(
    patch,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderInput,
    responses(
        (status = 200, description = "Order updated", body = OrderResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .order
        .update_order(user.user_id, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is past pending", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .order
        .delete_order(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/order-items",
    responses(
        (status = 200, description = "Lines of your orders", body = [OrderItemResponse]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_order_items(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .services
        .order
        .list_order_items(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(items))
}

#[utoipa::path(
    get,
    path = "/api/order-items/{id}",
    params(("id" = Uuid, Path, description = "Order item id")),
    responses(
        (status = 200, description = "Order line", body = OrderItemResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order_item(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .order
        .get_order_item(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

/// Add a line to one of your orders at the current price
#[utoipa::path(
    post,
    path = "/api/order-items",
    request_body = CreateOrderItemInput,
    responses(
        (status = 201, description = "Line added", body = OrderItemResponse),
        (status = 400, description = "Unknown order, product or variant", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order_item(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateOrderItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let item = state
        .services
        .order
        .create_order_item(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(item))
}
