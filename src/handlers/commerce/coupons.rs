use crate::auth::AuthUser;
use crate::dto::{CouponResponse, CouponValidationResponse};
use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, JsonBody, PathParam,
    QueryParams,
};
use crate::{errors::ApiError, services::commerce::coupon_service::CreateCouponInput, AppState};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;

/// Creates the router for coupon endpoints
pub fn coupons_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon))
        .route("/:code/validate", get(validate_coupon))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CouponCheckParams {
    /// Order subtotal the coupon would apply to
    pub subtotal: Decimal,
}

/// Create a coupon (admins only)
#[utoipa::path(
    post,
    path = "/api/coupons",
    request_body = CreateCouponInput,
    responses(
        (status = 201, description = "Coupon created", body = CouponResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn create_coupon(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateCouponInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let coupon = state
        .services
        .coupon
        .create_coupon(user.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(coupon))
}

/// Check a coupon against a subtotal without redeeming it
#[utoipa::path(
    get,
    path = "/api/coupons/{code}/validate",
    params(("code" = String, Path, description = "Coupon code"), CouponCheckParams),
    responses(
        (status = 200, description = "Discount the coupon would give", body = CouponValidationResponse),
        (status = 400, description = "Coupon not usable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    _user: AuthUser,
    State(state): State<AppState>,
    PathParam(code): PathParam<String>,
    QueryParams(params): QueryParams<CouponCheckParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.subtotal < Decimal::ZERO {
        return Err(ApiError::BadRequest {
            message: "subtotal cannot be negative".to_string(),
        });
    }
    let result = state
        .services
        .coupon
        .validate_coupon(&code, params.subtotal)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(result))
}
