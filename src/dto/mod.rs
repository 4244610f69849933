//! Response projections.
//!
//! Each projection is assembled once per request from the stored entity plus
//! the aggregates it needs (counts, first image, liked flag).

pub mod catalog;
pub mod commerce;
pub mod identity;
pub mod social;

pub use catalog::{
    CategoryResponse, ColorResponse, ProductImageResponse, ProductResponse, ProductSummary,
    SellerResponse, SizeResponse, VariantResponse,
};
pub use commerce::{
    CartItemResponse, CartResponse, CouponResponse, CouponValidationResponse, OrderItemResponse,
    OrderResponse,
};
pub use identity::{
    AccessTokenResponse, AuthResponse, ProfileResponse, PublicProfileResponse, UserResponse,
};
pub use social::{
    CommentAuthor, CommentResponse, LikeResponse, LikeToggleResponse, ShareRecordResponse,
    ShareResponse,
};
