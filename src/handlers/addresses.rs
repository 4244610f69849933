use crate::{
    auth::AuthUser,
    entities::AddressModel,
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, no_content_response, success_response,
        validate_input, JsonBody, PathParam,
    },
    services::address_service::{CreateAddressInput, UpdateAddressInput},
    AppState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_addresses).post(create_address))
        .route(
            "/:id",
            get(get_address)
                .put(update_address)
                .patch(update_address)
                .delete(delete_address),
        )
}

/// The caller's addresses, defaults first
#[utoipa::path(
    get,
    path = "/api/addresses",
    responses(
        (status = 200, description = "Addresses", body = [AddressModel]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn list_addresses(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let addresses = state
        .services
        .address
        .list_addresses(user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(addresses))
}

#[utoipa::path(
    post,
    path = "/api/addresses",
    request_body = CreateAddressInput,
    responses(
        (status = 201, description = "Address created", body = AddressModel),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn create_address(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateAddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let address = state
        .services
        .address
        .create_address(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(address))
}

#[utoipa::path(
    get,
    path = "/api/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Address", body = AddressModel),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn get_address(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state
        .services
        .address
        .get_address(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(address))
}

#[utoipa::path(
    patch,
    path = "/api/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    request_body = UpdateAddressInput,
    responses(
        (status = 200, description = "Address updated", body = AddressModel),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn update_address(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateAddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let address = state
        .services
        .address
        .update_address(user.user_id, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(address))
}

#[utoipa::path(
    delete,
    path = "/api/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 204, description = "Address deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Addresses"
)]
pub async fn delete_address(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .address
        .delete_address(user.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
