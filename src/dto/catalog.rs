use crate::entities::catalog::{ProductGender, ProductStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductImageResponse {
    pub image: String,
    pub is_main: bool,
}

/// Public seller card shown on product pages
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SellerResponse {
    pub id: Uuid,
    pub avatar: String,
    pub name: String,
    /// `@username`
    pub handle: String,
    pub verified: bool,
}

/// Full product projection
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub product_name: String,
    /// Alias of `product_name`
    pub name: String,
    pub slug: String,
    pub description: String,
    pub gender: ProductGender,
    pub stock_quantity: i32,
    /// Product sizes merged with variant sizes, sorted
    pub sizes: Vec<String>,
    pub categories: Vec<String>,
    /// First category name
    pub category: Option<String>,
    pub tags: String,
    pub base_price: Decimal,
    pub discount_percentage: Decimal,
    pub final_price: Decimal,
    /// Alias of `final_price`
    pub price: Decimal,
    pub sku: Option<String>,
    pub status: ProductStatus,
    pub is_featured: bool,
    pub views: i32,
    pub average_rating: Decimal,
    /// Alias of `average_rating`
    pub rating: Decimal,
    pub images: Vec<ProductImageResponse>,
    /// Main image URL, else the first image
    pub image: Option<String>,
    pub seller: Option<SellerResponse>,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub user_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact product card embedded in cart lines
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    pub id: Uuid,
    pub product_name: String,
    pub slug: String,
    pub final_price: Decimal,
    pub status: ProductStatus,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VariantResponse {
    pub id: Uuid,
    pub product: Uuid,
    pub size: Option<String>,
    pub color: Option<String>,
    pub color_hex: Option<String>,
    pub price_adjustment: Decimal,
    /// Product final price plus the adjustment
    pub price: Decimal,
    pub stock_quantity: i32,
    pub sku: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub parent: Option<Uuid>,
    pub children: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SizeResponse {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColorResponse {
    pub id: Uuid,
    pub name: String,
    pub hex_code: Option<String>,
}
