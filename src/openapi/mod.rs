use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "WearUp API",
        version = "1.0.0",
        description = r#"
# WearUp Fashion Marketplace API

Backend for a fashion marketplace: sellers list products, shoppers browse,
like, comment and share them, fill a cart and check out.

## Authentication

Register or log in to receive an access/refresh token pair. Send the access
token on every authenticated request:

```
Authorization: Bearer <access-token>
```

Exchange the refresh token at `/api/auth/token/refresh` when the access token
expires; revoke it at `/api/auth/logout`.

## Error Handling

Errors share one envelope:

```json
{
  "error": "Bad Request",
  "message": "Validation failed",
  "details": { "email": ["email"] },
  "request_id": "req-abc123",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

## Pagination

`/api/products` and `/api/orders` accept `page` (default 1) and `per_page`
(default 20, max 100) and answer `{ "data": [...], "pagination": {...} }`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8000", description = "Local development")),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, tokens and the caller's profile"),
        (name = "Users", description = "Public seller profiles"),
        (name = "Addresses", description = "Saved shipping and billing addresses"),
        (name = "Products", description = "Product catalog"),
        (name = "Catalog", description = "Categories, sizes and colors"),
        (name = "Social", description = "Likes, comments and shares"),
        (name = "Carts", description = "Shopping cart"),
        (name = "Orders", description = "Orders and checkout"),
        (name = "Coupons", description = "Discount coupons"),
        (name = "Health", description = "Liveness and status")
    ),
    paths(
        // Auth & identity
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::get_profile,
        crate::handlers::auth::update_profile,
        crate::handlers::users::get_user,
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
        crate::handlers::addresses::get_address,
        crate::handlers::addresses::update_address,
        crate::handlers::addresses::delete_address,

        // Catalog
        crate::handlers::commerce::products::list_products,
        crate::handlers::commerce::products::get_product,
        crate::handlers::commerce::products::create_product,
        crate::handlers::commerce::products::replace_product,
        crate::handlers::commerce::products::patch_product,
        crate::handlers::commerce::products::delete_product,
        crate::handlers::commerce::products::list_variants,
        crate::handlers::commerce::products::create_variant,
        crate::handlers::commerce::catalog::list_categories,
        crate::handlers::commerce::catalog::list_sizes,
        crate::handlers::commerce::catalog::list_colors,

        // Social
        crate::handlers::social::toggle_like,
        crate::handlers::social::share_product,
        crate::handlers::social::list_likes,
        crate::handlers::social::create_like,
        crate::handlers::social::delete_like,
        crate::handlers::social::list_comments,
        crate::handlers::social::get_comment,
        crate::handlers::social::create_comment,
        crate::handlers::social::update_comment,
        crate::handlers::social::delete_comment,
        crate::handlers::social::list_shares,
        crate::handlers::social::create_share,

        // Carts, orders & coupons
        crate::handlers::commerce::carts::list_carts,
        crate::handlers::commerce::carts::create_cart,
        crate::handlers::commerce::carts::get_cart,
        crate::handlers::commerce::carts::delete_cart,
        crate::handlers::commerce::carts::list_cart_items,
        crate::handlers::commerce::carts::add_cart_item,
        crate::handlers::commerce::carts::get_cart_item,
        crate::handlers::commerce::carts::update_cart_item,
        crate::handlers::commerce::carts::remove_cart_item,
        crate::handlers::commerce::orders::list_orders,
        crate::handlers::commerce::orders::create_order,
        crate::handlers::commerce::orders::checkout,
        crate::handlers::commerce::orders::get_order,
        crate::handlers::commerce::orders::update_order,
        crate::handlers::commerce::orders::delete_order,
        crate::handlers::commerce::orders::list_order_items,
        crate::handlers::commerce::orders::get_order_item,
        crate::handlers::commerce::orders::create_order_item,
        crate::handlers::commerce::coupons::create_coupon,
        crate::handlers::commerce::coupons::validate_coupon,

        // Health
        crate::health_check,
        crate::api_status,
    ),
    components(
        schemas(
            crate::handlers::common::PaginationMeta,
            crate::auth::TokenPair,
            crate::media::ImageUpload,
            crate::entities::UserRole,
            crate::entities::ProfileGender,
            crate::entities::AddressType,
            crate::entities::catalog::product::ProductStatus,
            crate::entities::catalog::product::ProductGender,
            crate::entities::commerce::order::OrderStatus,
            crate::entities::commerce::order::PaymentStatus,
            crate::entities::commerce::coupon::DiscountType,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths_and_bearer_scheme() {
        let openapi = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("WearUp API"));
        assert!(json.contains("/api/products/{id}/toggle-like"));
        assert!(json.contains("/api/orders/checkout"));
        assert!(json.contains("/api/coupons/{code}/validate"));
        assert!(openapi
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("Bearer")));
    }
}
