use crate::dto::{CategoryResponse, ColorResponse, SizeResponse};
use crate::handlers::common::{map_service_error, success_response};
use crate::{errors::ApiError, AppState};
use axum::{extract::State, response::IntoResponse, routing::get, Router};

/// Read-only taxonomy endpoints, merged at the API root.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/sizes", get(list_sizes))
        .route("/colors", get(list_colors))
}

/// All categories with their parent and children
#[utoipa::path(
    get,
    path = "/api/categories",
    responses((status = 200, description = "Categories", body = [CategoryResponse])),
    tag = "Catalog"
)]
pub async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let categories = state
        .services
        .product_catalog
        .list_categories()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(categories))
}

#[utoipa::path(
    get,
    path = "/api/sizes",
    responses((status = 200, description = "Sizes", body = [SizeResponse])),
    tag = "Catalog"
)]
pub async fn list_sizes(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let sizes = state
        .services
        .product_catalog
        .list_sizes()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(sizes))
}

#[utoipa::path(
    get,
    path = "/api/colors",
    responses((status = 200, description = "Colors", body = [ColorResponse])),
    tag = "Catalog"
)]
pub async fn list_colors(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let colors = state
        .services
        .product_catalog
        .list_colors()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(colors))
}
