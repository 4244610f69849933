//! Catalog and commerce services: products, carts, orders and coupons.
pub mod cart_service;
pub mod coupon_service;
pub mod order_service;
pub mod pricing;
pub mod product_catalog_service;
pub mod product_projection;
pub mod slug;

pub use cart_service::{AddCartItemInput, CartService, UpdateCartItemInput};
pub use coupon_service::{CouponService, CreateCouponInput};
pub use order_service::{
    CheckoutInput, CreateOrderInput, CreateOrderItemInput, OrderListQuery, OrderService,
    UpdateOrderInput,
};
pub use product_catalog_service::{
    CreateProductInput, CreateVariantInput, ProductCatalogService, ProductSearchQuery,
    UpdateProductInput,
};
