use crate::services::commerce::pricing;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Product entity for the catalog
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub seller_id: Option<Uuid>,
    pub product_name: String,
    #[sea_orm(unique)]
    pub slug: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub gender: ProductGender,
    /// Comma separated
    pub tags: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub base_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub discount_percentage: Decimal,
    /// Derived from `base_price` and `discount_percentage` on every save.
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub final_price: Decimal,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((8, 2)))", nullable)]
    pub weight: Option<Decimal>,
    pub dimensions: Option<String>,
    pub status: ProductStatus,
    pub is_featured: bool,
    pub is_digital: bool,
    pub views: i32,
    #[sea_orm(column_type = "Decimal(Some((3, 2)))")]
    pub average_rating: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::auth::user::Entity",
        from = "Column::SellerId",
        to = "crate::auth::user::Column::Id",
        on_delete = "SetNull"
    )]
    Seller,
    #[sea_orm(has_many = "super::product_image::Entity")]
    ProductImages,
    #[sea_orm(has_many = "super::product_variant::Entity")]
    ProductVariants,
    #[sea_orm(has_many = "super::product_category::Entity")]
    ProductCategories,
    #[sea_orm(has_many = "super::product_size::Entity")]
    ProductSizes,
}

impl Related<crate::auth::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seller.def()
    }
}

impl Related<super::product_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductImages.def()
    }
}

impl Related<super::product_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductVariants.def()
    }
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        super::product_category::Relation::Category.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::product_category::Relation::Product.def().rev())
    }
}

impl Related<super::size::Entity> for Entity {
    fn to() -> RelationDef {
        super::product_size::Relation::Size.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::product_size::Relation::Product.def().rev())
    }
}

fn current<V>(value: &ActiveValue<V>) -> Option<V>
where
    V: Into<sea_orm::Value> + Clone,
{
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v.clone()),
        ActiveValue::NotSet => None,
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// Recomputes `final_price` on every insert and update so it can never
    /// drift from its inputs.
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        match (
            current(&self.base_price),
            current(&self.discount_percentage),
        ) {
            (Some(base), Some(discount)) => {
                self.final_price = Set(pricing::final_price(base, discount));
            }
            _ if insert => {
                return Err(DbErr::Custom(
                    "product insert requires base_price and discount_percentage".to_string(),
                ));
            }
            _ => {}
        }

        if !insert {
            self.updated_at = Set(Utc::now());
        }

        Ok(self)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "sold_out")]
    SoldOut,
    #[sea_orm(string_value = "pending")]
    Pending,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum ProductGender {
    #[sea_orm(string_value = "Men")]
    Men,
    #[sea_orm(string_value = "Women")]
    Women,
    #[default]
    #[sea_orm(string_value = "Unisex")]
    Unisex,
}
