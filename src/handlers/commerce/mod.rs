pub mod carts;
pub mod catalog;
pub mod coupons;
pub mod orders;
/// Commerce API handlers module
pub mod products;

// Re-export route builders
pub use carts::{cart_items_routes, carts_routes};
pub use catalog::catalog_routes;
pub use coupons::coupons_routes;
pub use orders::{order_items_routes, orders_routes};
pub use products::products_routes;
