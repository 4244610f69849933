use crate::auth::{AuthUser, OptionalAuthUser};
use crate::dto::{ProductResponse, VariantResponse};
use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
    JsonBody, PaginatedResponse, PathParam, QueryParams, SESSION_HEADER,
};
use crate::{
    errors::ApiError,
    services::commerce::product_catalog_service::{
        CreateProductInput, CreateVariantInput, ProductSearchQuery, UpdateProductInput,
    },
    AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product)
                .put(replace_product)
                .patch(patch_product)
                .delete(delete_product),
        )
        .route("/:id/variants", get(list_variants).post(create_variant))
        .merge(crate::handlers::social::product_action_routes())
}

/// Product listing filters
#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListParams {
    /// Seller id
    pub seller: Option<Uuid>,
    /// Alias of `seller`
    pub user: Option<Uuid>,
    /// Case-insensitive match on name, description or category
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    pub per_page: Option<u64>,
}

fn default_page() -> u64 {
    1
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// List products, newest first
#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductListParams),
    responses(
        (status = 200, description = "Page of products", body = PaginatedResponse<ProductResponse>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ProductListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.page.max(1);
    let per_page = state.config.page_size(params.per_page);
    let query = ProductSearchQuery {
        seller: params.seller.or(params.user),
        search: params.search,
        page,
        per_page,
    };

    let (products, total) = state
        .services
        .product_catalog
        .list_products(query, viewer.user_id())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        products, page, per_page, total,
    )))
}

/// Get a product; counts a view
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product id"),
        ("X-Session-Id" = Option<String>, Header, description = "Anonymous session used to record the view")
    ),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .product_catalog
        .retrieve_product(id, viewer.user_id(), session_id(&headers))
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

/// Create a product owned by the caller
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug could not be allocated", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_product(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let product = state
        .services
        .product_catalog
        .create_product(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(product))
}

/// Replace a product; `product_name` and `gender` are required
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn replace_product(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    payload.ensure_complete().map_err(map_service_error)?;
    let product = state
        .services
        .product_catalog
        .update_product(id, payload, user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

/// Partially update a product
#[utoipa::path(
    patch,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn patch_product(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let product = state
        .services
        .product_catalog
        .update_product(id, payload, user.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

/// Delete a product that no order references
#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Referenced by an order", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    _user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .product_catalog
        .delete_product(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Variants of a product
#[utoipa::path(
    get,
    path = "/api/products/{id}/variants",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Variants", body = [VariantResponse]),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_variants(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let variants = state
        .services
        .product_catalog
        .list_variants(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(variants))
}

/// Add a size/color variant to a product
#[utoipa::path(
    post,
    path = "/api/products/{id}/variants",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = CreateVariantInput,
    responses(
        (status = 201, description = "Variant created", body = VariantResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate SKU", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_variant(
    _user: AuthUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<CreateVariantInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let variant = state
        .services
        .product_catalog
        .create_variant(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(variant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn blank_session_header_is_ignored() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);
        headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
        assert_eq!(session_id(&headers), None);
        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc123"));
        assert_eq!(session_id(&headers).as_deref(), Some("abc123"));
    }
}
