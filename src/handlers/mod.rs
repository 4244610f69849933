pub mod addresses;
pub mod auth;
pub mod commerce;
pub mod common;
pub mod social;
pub mod users;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::media::MediaStore;
use crate::services::{
    commerce::{CartService, CouponService, OrderService, ProductCatalogService},
    AddressService, ProfileService, SocialService,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub product_catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub order: Arc<OrderService>,
    pub coupon: Arc<CouponService>,
    pub social: Arc<SocialService>,
    pub profile: Arc<ProfileService>,
    pub address: Arc<AddressService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        media: Arc<MediaStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            product_catalog: Arc::new(ProductCatalogService::new(
                db.clone(),
                event_sender.clone(),
                media.clone(),
            )),
            cart: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            order: Arc::new(OrderService::new(
                db.clone(),
                event_sender.clone(),
                config.default_tax_rate,
                config.shipping_flat_rate,
            )),
            coupon: Arc::new(CouponService::new(db.clone(), event_sender.clone())),
            social: Arc::new(SocialService::new(db.clone(), event_sender.clone())),
            profile: Arc::new(ProfileService::new(db.clone(), event_sender, media)),
            address: Arc::new(AddressService::new(db)),
        }
    }
}
