use crate::{
    db::{get_or_create, insert_with_savepoint, MAX_INSERT_ATTEMPTS},
    dto::{CategoryResponse, ColorResponse, ProductResponse, SizeResponse, VariantResponse},
    entities::{
        catalog::{
            category, color, product, product_category, product_image, product_size,
            product_variant, size, Category, Color, Product, ProductCategory, ProductGender,
            ProductImage, ProductSize, ProductStatus, ProductVariant, Size,
        },
        commerce::{order_item, OrderItem},
        social::{product_view, ProductView},
    },
    errors::{DbErrExt, ServiceError},
    events::{Event, EventSender},
    media::{decode_image, DecodedImage, ImageUpload, MediaStore, StoredFile},
    services::commerce::{
        pricing::{money, unit_price},
        product_projection::ProductProjector,
        slug,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_decimal_min_zero(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("decimal_min_zero"));
    }
    Ok(())
}

fn validate_percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percentage_range"));
    }
    Ok(())
}

/// A list of names sent either as a JSON array or as a JSON-encoded string.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
pub enum NameList {
    List(Vec<String>),
    Encoded(String),
}

impl NameList {
    /// Parsed names with blanks and duplicates removed.
    ///
    /// An empty string means "no change" and yields `None`.
    pub fn names(&self, field: &str) -> Result<Option<Vec<String>>, ServiceError> {
        let raw = match self {
            NameList::List(names) => names.clone(),
            NameList::Encoded(text) if text.trim().is_empty() => return Ok(None),
            NameList::Encoded(text) => serde_json::from_str::<Vec<String>>(text).map_err(|_| {
                ServiceError::ValidationError(format!(
                    "{}: expected a JSON encoded list of names",
                    field
                ))
            })?,
        };

        let mut seen = HashSet::new();
        Ok(Some(
            raw.into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .filter(|name| seen.insert(name.clone()))
                .collect(),
        ))
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub product_name: String,
    #[serde(default)]
    pub description: String,
    pub gender: Option<ProductGender>,
    #[validate(length(max = 500))]
    pub tags: Option<String>,
    #[serde(alias = "base_price_input")]
    #[validate(custom = "validate_decimal_min_zero")]
    pub base_price: Decimal,
    #[validate(custom = "validate_percentage")]
    pub discount_percentage: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
    #[validate(length(max = 100))]
    pub sku: Option<String>,
    #[validate(length(max = 100))]
    pub barcode: Option<String>,
    #[validate(custom = "validate_decimal_min_zero")]
    pub weight: Option<Decimal>,
    pub dimensions: Option<String>,
    pub status: Option<ProductStatus>,
    pub is_featured: Option<bool>,
    pub is_digital: Option<bool>,
    pub sizes: Option<NameList>,
    pub categories: Option<NameList>,
    pub main_image: Option<ImageUpload>,
    pub additional_images: Option<Vec<ImageUpload>>,
}

/// Input for PUT and PATCH. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub product_name: Option<String>,
    pub description: Option<String>,
    pub gender: Option<ProductGender>,
    #[validate(length(max = 500))]
    pub tags: Option<String>,
    #[serde(alias = "base_price_input")]
    #[validate(custom = "validate_decimal_min_zero")]
    pub base_price: Option<Decimal>,
    #[validate(custom = "validate_percentage")]
    pub discount_percentage: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
    #[validate(length(max = 100))]
    pub sku: Option<String>,
    #[validate(length(max = 100))]
    pub barcode: Option<String>,
    #[validate(custom = "validate_decimal_min_zero")]
    pub weight: Option<Decimal>,
    pub dimensions: Option<String>,
    pub status: Option<ProductStatus>,
    pub is_featured: Option<bool>,
    pub is_digital: Option<bool>,
    pub sizes: Option<NameList>,
    pub categories: Option<NameList>,
    pub main_image: Option<ImageUpload>,
    pub additional_images: Option<Vec<ImageUpload>>,
}

impl UpdateProductInput {
    /// PUT replaces the product and must carry its required fields.
    pub fn ensure_complete(&self) -> Result<(), ServiceError> {
        let mut missing = Vec::new();
        if self.product_name.is_none() {
            missing.push("product_name");
        }
        if self.gender.is_none() {
            missing.push("gender");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Input for adding a variant to a product
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateVariantInput {
    #[validate(length(min = 1, max = 20))]
    pub size: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub color: Option<String>,
    #[validate(length(max = 7))]
    pub color_hex: Option<String>,
    pub price_adjustment: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(length(min = 1, max = 100))]
    pub sku: Option<String>,
}

/// Filters for the product listing
#[derive(Debug, Clone, Default)]
pub struct ProductSearchQuery {
    pub seller: Option<Uuid>,
    pub search: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

/// Uploads decoded ahead of any database work
struct PendingImages {
    main: Option<DecodedImage>,
    additional: Vec<DecodedImage>,
}

impl PendingImages {
    fn decode(
        main: Option<&ImageUpload>,
        additional: Option<&Vec<ImageUpload>>,
    ) -> Result<Self, ServiceError> {
        let main = main.map(|u| decode_image("main_image", u)).transpose()?;
        let additional = additional
            .map(|list| {
                list.iter()
                    .map(|u| decode_image("additional_images", u))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Self { main, additional })
    }

    fn is_empty(&self) -> bool {
        self.main.is_none() && self.additional.is_empty()
    }

    fn all(&self) -> Vec<DecodedImage> {
        self.main
            .iter()
            .chain(self.additional.iter())
            .cloned()
            .collect()
    }
}

/// Product catalog service: products, their images, sizes, categories and variants.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    media: Arc<MediaStore>,
}

impl ProductCatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        media: Arc<MediaStore>,
    ) -> Self {
        Self {
            db,
            event_sender,
            media,
        }
    }

    async fn find_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    /// Lists products, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductSearchQuery,
        viewer: Option<Uuid>,
    ) -> Result<(Vec<ProductResponse>, u64), ServiceError> {
        let mut select = Product::find();

        if let Some(seller) = query.seller {
            select = select.filter(product::Column::SellerId.eq(seller));
        }

        if let Some(term) = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            let pattern = format!("%{}%", term.to_lowercase());

            let by_category: Vec<Uuid> = ProductCategory::find()
                .select_only()
                .column(product_category::Column::ProductId)
                .join(JoinType::InnerJoin, product_category::Relation::Category.def())
                .filter(
                    Expr::expr(Func::lower(Expr::col((Category, category::Column::Name))))
                        .like(pattern.as_str()),
                )
                .into_tuple()
                .all(&*self.db)
                .await?;

            select = select.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            Product,
                            product::Column::ProductName,
                        ))))
                        .like(pattern.as_str()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            Product,
                            product::Column::Description,
                        ))))
                        .like(pattern.as_str()),
                    )
                    .add(product::Column::Id.is_in(by_category)),
            );
        }

        let paginator = select
            .order_by_desc(product::Column::CreatedAt)
            .order_by_asc(product::Column::Id)
            .paginate(&*self.db, query.per_page.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(query.page.saturating_sub(1)).await?;

        let projected = ProductProjector::new(&*self.db, viewer).many(products).await?;
        Ok((projected, total))
    }

    /// Returns a product and counts the visit.
    ///
    /// `views` is bumped atomically; the view row is recorded for the user, or
    /// for the anonymous session when one is supplied.
    #[instrument(skip(self))]
    pub async fn retrieve_product(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<ProductResponse, ServiceError> {
        let bumped = Product::update_many()
            .col_expr(product::Column::Views, Expr::col(product::Column::Views).add(1))
            .filter(product::Column::Id.eq(id))
            .exec(&*self.db)
            .await?;
        if bumped.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }

        self.record_view(id, viewer, session_id).await?;

        let product = self.find_product(id).await?;
        ProductProjector::new(&*self.db, viewer).one(product).await
    }

    async fn record_view(
        &self,
        product_id: Uuid,
        viewer: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<(), ServiceError> {
        let session_id = match (viewer, session_id) {
            (Some(_), _) => String::new(),
            (None, Some(session)) if !session.trim().is_empty() => session.trim().to_string(),
            (None, _) => return Ok(()),
        };

        // NULL user ids never collide in the unique index.
        if viewer.is_none() {
            let seen = ProductView::find()
                .filter(product_view::Column::ProductId.eq(product_id))
                .filter(product_view::Column::UserId.is_null())
                .filter(product_view::Column::SessionId.eq(session_id.as_str()))
                .count(&*self.db)
                .await?;
            if seen > 0 {
                return Ok(());
            }
        }

        let view = product_view::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(viewer),
            product_id: Set(product_id),
            session_id: Set(session_id),
            viewed_at: Set(Utc::now()),
        };
        match view.insert(&*self.db).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_unique_violation() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates a product owned by `seller_id`.
    #[instrument(skip(self, input), fields(product_name = %input.product_name))]
    pub async fn create_product(
        &self,
        seller_id: Uuid,
        input: CreateProductInput,
    ) -> Result<ProductResponse, ServiceError> {
        let sizes = match &input.sizes {
            Some(list) => list.names("sizes")?.unwrap_or_default(),
            None => Vec::new(),
        };
        let categories = match &input.categories {
            Some(list) => list.names("categories")?.unwrap_or_default(),
            None => Vec::new(),
        };
        let pending =
            PendingImages::decode(input.main_image.as_ref(), input.additional_images.as_ref())?;
        let stored = self.media.save_all("products", &pending.all()).await?;

        let result = self
            .create_in_transaction(seller_id, &input, &sizes, &categories, &pending, &stored)
            .await;
        let product = match result {
            Ok(product) => product,
            Err(e) => {
                self.media.discard(&stored).await;
                return Err(e);
            }
        };

        self.event_sender
            .send_or_log(Event::ProductCreated(product.id))
            .await;
        info!("Created product: {} ({})", product.id, product.slug);

        ProductProjector::new(&*self.db, Some(seller_id))
            .one(product)
            .await
    }

    async fn create_in_transaction(
        &self,
        seller_id: Uuid,
        input: &CreateProductInput,
        sizes: &[String],
        categories: &[String],
        pending: &PendingImages,
        stored: &[StoredFile],
    ) -> Result<product::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let base = slug::slugify(&input.product_name);

        let product = insert_with_unique_slug(&txn, &base, |slug| product::ActiveModel {
            id: Set(Uuid::new_v4()),
            seller_id: Set(Some(seller_id)),
            product_name: Set(input.product_name.trim().to_string()),
            slug: Set(slug),
            description: Set(input.description.clone()),
            gender: Set(input.gender.unwrap_or_default()),
            tags: Set(input.tags.clone().unwrap_or_default()),
            base_price: Set(money(input.base_price)),
            discount_percentage: Set(money(input.discount_percentage.unwrap_or(Decimal::ZERO))),
            stock_quantity: Set(input.stock_quantity.unwrap_or(0)),
            low_stock_threshold: Set(input.low_stock_threshold.unwrap_or(10)),
            sku: Set(input.sku.clone()),
            barcode: Set(input.barcode.clone()),
            weight: Set(input.weight),
            dimensions: Set(input.dimensions.clone()),
            status: Set(input.status.unwrap_or_default()),
            is_featured: Set(input.is_featured.unwrap_or(false)),
            is_digital: Set(input.is_digital.unwrap_or(false)),
            views: Set(0),
            average_rating: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .await?;

        link_sizes(&txn, product.id, sizes).await?;
        link_categories(&txn, product.id, categories).await?;
        insert_images(&txn, &product, pending, stored).await?;

        txn.commit().await?;
        Ok(product)
    }

    /// Updates a product. Sizes, categories and images change only when their
    /// fields are present; any failure leaves the product untouched.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
        viewer: Uuid,
    ) -> Result<ProductResponse, ServiceError> {
        self.find_product(id).await?;

        let sizes = match &input.sizes {
            Some(list) => list.names("sizes")?,
            None => None,
        };
        let categories = match &input.categories {
            Some(list) => list.names("categories")?,
            None => None,
        };
        let pending =
            PendingImages::decode(input.main_image.as_ref(), input.additional_images.as_ref())?;
        let stored = self.media.save_all("products", &pending.all()).await?;

        let result = self
            .update_in_transaction(id, input, sizes, categories, &pending, &stored)
            .await;
        let (product, replaced) = match result {
            Ok(done) => done,
            Err(e) => {
                self.media.discard(&stored).await;
                return Err(e);
            }
        };
        self.media.remove_urls(&replaced).await;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product.id))
            .await;
        info!("Updated product: {}", product.id);

        ProductProjector::new(&*self.db, Some(viewer))
            .one(product)
            .await
    }

    async fn update_in_transaction(
        &self,
        id: Uuid,
        input: UpdateProductInput,
        sizes: Option<Vec<String>>,
        categories: Option<Vec<String>>,
        pending: &PendingImages,
        stored: &[StoredFile],
    ) -> Result<(product::Model, Vec<String>), ServiceError> {
        let txn = self.db.begin().await?;

        let existing = Product::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let mut active = existing.into_active_model();
        if let Some(name) = input.product_name {
            active.product_name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(gender) = input.gender {
            active.gender = Set(gender);
        }
        if let Some(tags) = input.tags {
            active.tags = Set(tags);
        }
        if let Some(base_price) = input.base_price {
            active.base_price = Set(money(base_price));
        }
        if let Some(discount) = input.discount_percentage {
            active.discount_percentage = Set(money(discount));
        }
        if let Some(stock) = input.stock_quantity {
            active.stock_quantity = Set(stock);
        }
        if let Some(threshold) = input.low_stock_threshold {
            active.low_stock_threshold = Set(threshold);
        }
        if let Some(sku) = input.sku {
            active.sku = Set(Some(sku));
        }
        if let Some(barcode) = input.barcode {
            active.barcode = Set(Some(barcode));
        }
        if let Some(weight) = input.weight {
            active.weight = Set(Some(weight));
        }
        if let Some(dimensions) = input.dimensions {
            active.dimensions = Set(Some(dimensions));
        }
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        if let Some(featured) = input.is_featured {
            active.is_featured = Set(featured);
        }
        if let Some(digital) = input.is_digital {
            active.is_digital = Set(digital);
        }
        let product = active.update(&txn).await?;

        if let Some(sizes) = sizes {
            ProductSize::delete_many()
                .filter(product_size::Column::ProductId.eq(id))
                .exec(&txn)
                .await?;
            link_sizes(&txn, id, &sizes).await?;
        }

        if let Some(categories) = categories {
            ProductCategory::delete_many()
                .filter(product_category::Column::ProductId.eq(id))
                .exec(&txn)
                .await?;
            link_categories(&txn, id, &categories).await?;
        }

        let mut replaced = Vec::new();
        if !pending.is_empty() {
            replaced = ProductImage::find()
                .filter(product_image::Column::ProductId.eq(id))
                .all(&txn)
                .await?
                .into_iter()
                .map(|img| img.image)
                .collect();
            ProductImage::delete_many()
                .filter(product_image::Column::ProductId.eq(id))
                .exec(&txn)
                .await?;
            insert_images(&txn, &product, pending, stored).await?;
        }

        txn.commit().await?;
        Ok((product, replaced))
    }

    /// Deletes a product unless an order line references it.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        Product::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let ordered = OrderItem::find()
            .filter(order_item::Column::ProductId.eq(id))
            .count(&txn)
            .await?;
        if ordered > 0 {
            return Err(ServiceError::Conflict(format!(
                "Product {} is referenced by {} order item(s) and cannot be deleted",
                id, ordered
            )));
        }

        let images: Vec<String> = ProductImage::find()
            .filter(product_image::Column::ProductId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|img| img.image)
            .collect();

        match Product::delete_by_id(id).exec(&txn).await {
            Ok(_) => {}
            Err(e) if e.is_foreign_key_violation() => {
                return Err(ServiceError::Conflict(format!(
                    "Product {} is referenced by an order and cannot be deleted",
                    id
                )));
            }
            Err(e) => return Err(e.into()),
        }
        txn.commit().await?;

        self.media.remove_urls(&images).await;
        self.event_sender
            .send_or_log(Event::ProductDeleted(id))
            .await;
        info!("Deleted product: {}", id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_variants(&self, product_id: Uuid) -> Result<Vec<VariantResponse>, ServiceError> {
        let product = self.find_product(product_id).await?;
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::Sku)
            .all(&*self.db)
            .await?;

        let size_ids: Vec<Uuid> = variants.iter().filter_map(|v| v.size_id).collect();
        let color_ids: Vec<Uuid> = variants.iter().filter_map(|v| v.color_id).collect();
        let sizes: HashMap<Uuid, size::Model> = Size::find()
            .filter(size::Column::Id.is_in(size_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let colors: HashMap<Uuid, color::Model> = Color::find()
            .filter(color::Column::Id.is_in(color_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(variants
            .into_iter()
            .map(|v| {
                let size = v.size_id.and_then(|id| sizes.get(&id));
                let color = v.color_id.and_then(|id| colors.get(&id));
                variant_response(&product, v, size, color)
            })
            .collect())
    }

    /// Adds a size/color variant; unknown size and color names are created.
    #[instrument(skip(self, input))]
    pub async fn create_variant(
        &self,
        product_id: Uuid,
        input: CreateVariantInput,
    ) -> Result<VariantResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let size = match input.size.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => Some(get_or_create_size(&txn, name).await?),
            None => None,
        };
        let color = match input.color.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(name) => {
                let hex = input.color_hex.clone();
                Some(
                    get_or_create::<_, Color, color::ActiveModel, _>(
                        &txn,
                        color::Column::Name,
                        name,
                        || color::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            name: Set(name.to_string()),
                            hex_code: Set(hex.clone()),
                        },
                    )
                    .await?,
                )
            }
            None => None,
        };

        let build = |sku: String| product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            size_id: Set(size.as_ref().map(|s| s.id)),
            color_id: Set(color.as_ref().map(|c| c.id)),
            price_adjustment: Set(money(input.price_adjustment.unwrap_or(Decimal::ZERO))),
            stock_quantity: Set(input.stock_quantity.unwrap_or(0)),
            sku: Set(sku),
        };

        let variant = match input.sku.as_deref().map(str::trim) {
            Some(sku) => insert_with_savepoint(&txn, build(sku.to_string()))
                .await
                .map_err(|e| {
                    if e.is_unique_violation() {
                        ServiceError::Conflict(format!("SKU '{}' already exists", sku))
                    } else {
                        e.into()
                    }
                })?,
            None => {
                let mut inserted = None;
                for _ in 0..MAX_INSERT_ATTEMPTS {
                    let sku = format!(
                        "{}-{}",
                        product.slug.to_uppercase(),
                        slug::random_code(6)
                    );
                    match insert_with_savepoint(&txn, build(sku)).await {
                        Ok(v) => {
                            inserted = Some(v);
                            break;
                        }
                        Err(e) if e.is_unique_violation() => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                inserted.ok_or_else(|| {
                    ServiceError::Conflict("Could not generate a unique SKU; please retry".into())
                })?
            }
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::VariantCreated {
                product_id,
                variant_id: variant.id,
            })
            .await;
        info!("Created variant {} for product {}", variant.id, product_id);

        Ok(variant_response(&product, variant, size.as_ref(), color.as_ref()))
    }

    /// Categories with their parent and direct children.
    pub async fn list_categories(&self) -> Result<Vec<CategoryResponse>, ServiceError> {
        let categories = Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for cat in &categories {
            if let Some(parent) = cat.parent_id {
                children.entry(parent).or_default().push(cat.id);
            }
        }

        Ok(categories
            .into_iter()
            .map(|cat| CategoryResponse {
                children: children.remove(&cat.id).unwrap_or_default(),
                id: cat.id,
                name: cat.name,
                description: cat.description,
                image: cat.image,
                parent: cat.parent_id,
            })
            .collect())
    }

    pub async fn list_sizes(&self) -> Result<Vec<SizeResponse>, ServiceError> {
        Ok(Size::find()
            .order_by_asc(size::Column::Name)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|s| SizeResponse {
                id: s.id,
                name: s.name,
            })
            .collect())
    }

    pub async fn list_colors(&self) -> Result<Vec<ColorResponse>, ServiceError> {
        Ok(Color::find()
            .order_by_asc(color::Column::Name)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| ColorResponse {
                id: c.id,
                name: c.name,
                hex_code: c.hex_code,
            })
            .collect())
    }
}

fn variant_response(
    product: &product::Model,
    variant: product_variant::Model,
    size: Option<&size::Model>,
    color: Option<&color::Model>,
) -> VariantResponse {
    VariantResponse {
        id: variant.id,
        product: variant.product_id,
        size: size.map(|s| s.name.clone()),
        color: color.map(|c| c.name.clone()),
        color_hex: color.and_then(|c| c.hex_code.clone()),
        price_adjustment: money(variant.price_adjustment),
        price: unit_price(product.final_price, Some(variant.price_adjustment)),
        stock_quantity: variant.stock_quantity,
        sku: variant.sku,
    }
}

/// Inserts a product under the first free slug derived from `base`.
///
/// Two writers can pick the same candidate; the loser of the unique
/// constraint re-reads and tries the next one.
async fn insert_with_unique_slug(
    txn: &DatabaseTransaction,
    base: &str,
    build: impl Fn(String) -> product::ActiveModel,
) -> Result<product::Model, ServiceError> {
    for attempt in 1..=MAX_INSERT_ATTEMPTS {
        let taken: Vec<String> = Product::find()
            .select_only()
            .column(product::Column::Slug)
            .filter(product::Column::Slug.starts_with(base))
            .into_tuple()
            .all(txn)
            .await?;
        let candidate = slug::next_free(base, taken.iter().map(String::as_str));

        match insert_with_savepoint(txn, build(candidate.clone())).await {
            Ok(product) => return Ok(product),
            Err(e) if e.is_unique_violation() => {
                warn!(
                    "Slug '{}' taken concurrently (attempt {}/{})",
                    candidate, attempt, MAX_INSERT_ATTEMPTS
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ServiceError::Conflict(format!(
        "Could not allocate a unique slug for '{}'; please retry",
        base
    )))
}

async fn get_or_create_size(txn: &DatabaseTransaction, name: &str) -> Result<size::Model, ServiceError> {
    get_or_create::<_, Size, size::ActiveModel, _>(txn, size::Column::Name, name, || size::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
    })
    .await
}

async fn link_sizes(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    names: &[String],
) -> Result<(), ServiceError> {
    let mut links = Vec::with_capacity(names.len());
    let mut seen = HashSet::new();
    for name in names {
        let size = get_or_create_size(txn, name).await?;
        if seen.insert(size.id) {
            links.push(product_size::ActiveModel {
                product_id: Set(product_id),
                size_id: Set(size.id),
            });
        }
    }
    if !links.is_empty() {
        ProductSize::insert_many(links)
            .exec_without_returning(txn)
            .await?;
    }
    Ok(())
}

async fn link_categories(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    names: &[String],
) -> Result<(), ServiceError> {
    let mut links = Vec::with_capacity(names.len());
    let mut seen = HashSet::new();
    for name in names {
        let category = get_or_create::<_, Category, category::ActiveModel, _>(
            txn,
            category::Column::Name,
            name,
            || category::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name.to_string()),
                description: Set(String::new()),
                image: Set(None),
                parent_id: Set(None),
            },
        )
        .await?;
        if seen.insert(category.id) {
            links.push(product_category::ActiveModel {
                product_id: Set(product_id),
                category_id: Set(category.id),
            });
        }
    }
    if !links.is_empty() {
        ProductCategory::insert_many(links)
            .exec_without_returning(txn)
            .await?;
    }
    Ok(())
}

async fn insert_images(
    txn: &DatabaseTransaction,
    product: &product::Model,
    pending: &PendingImages,
    stored: &[StoredFile],
) -> Result<(), ServiceError> {
    // `stored` follows `PendingImages::all`: main first, then additional.
    let has_main = pending.main.is_some();
    for (order, file) in stored.iter().enumerate() {
        product_image::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            image: Set(file.url.clone()),
            alt_text: Set(product.product_name.clone()),
            is_main: Set(has_main && order == 0),
            order: Set(order as i32),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn name_list_accepts_encoded_and_plain_arrays() {
        let encoded: NameList = serde_json::from_str(r#""[\"M\", \"L\", \"\", \"M\"]""#).unwrap();
        assert_eq!(
            encoded.names("sizes").unwrap(),
            Some(vec!["M".to_string(), "L".to_string()])
        );

        let plain: NameList = serde_json::from_str(r#"["Scarves", " Winter "]"#).unwrap();
        assert_eq!(
            plain.names("categories").unwrap(),
            Some(vec!["Scarves".to_string(), "Winter".to_string()])
        );
    }

    #[test]
    fn empty_encoded_list_means_untouched() {
        assert_eq!(NameList::Encoded(String::new()).names("sizes").unwrap(), None);
        assert_eq!(
            NameList::Encoded("[]".into()).names("sizes").unwrap(),
            Some(vec![])
        );
    }

    #[test]
    fn malformed_encoded_list_is_a_validation_error() {
        assert_matches!(
            NameList::Encoded("M, L".into()).names("sizes"),
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("sizes")
        );
    }

    #[test]
    fn create_input_rules() {
        let input: CreateProductInput = serde_json::from_value(serde_json::json!({
            "product_name": "Red Scarf",
            "base_price": "20.00",
            "discount_percentage": "10"
        }))
        .unwrap();
        assert!(input.validate().is_ok());

        let input: CreateProductInput = serde_json::from_value(serde_json::json!({
            "product_name": "Red Scarf",
            "base_price_input": "-1",
            "discount_percentage": "120"
        }))
        .unwrap();
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("base_price"));
        assert!(fields.contains_key("discount_percentage"));
    }

    #[test]
    fn put_requires_name_and_gender() {
        let partial = UpdateProductInput {
            product_name: Some("Scarf".into()),
            ..Default::default()
        };
        assert_matches!(
            partial.ensure_complete(),
            Err(ServiceError::ValidationError(msg)) if msg.contains("gender")
        );

        let full = UpdateProductInput {
            product_name: Some("Scarf".into()),
            gender: Some(ProductGender::Women),
            ..Default::default()
        };
        assert!(full.ensure_complete().is_ok());
    }
}
