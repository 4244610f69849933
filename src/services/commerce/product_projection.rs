use crate::{
    auth::user,
    dto::{ProductImageResponse, ProductResponse, ProductSummary, SellerResponse},
    entities::{
        catalog::{
            category, product, product_category, product_image, product_size, product_variant,
            size, ProductCategory, ProductImage, ProductSize, ProductVariant, Size,
        },
        social::{product_comment, product_like, product_share, ProductComment, ProductLike, ProductShare},
        user_profile, UserProfile,
    },
    errors::ServiceError,
    services::commerce::pricing::money,
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

fn avatar_fallback(username: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&size=40&background=667eea&color=fff",
        username
    )
}

/// Builds the seller card; a missing profile means an unverified seller.
pub fn seller_card(seller: &user::Model, profile: Option<&user_profile::Model>) -> SellerResponse {
    let avatar = profile
        .and_then(|p| p.profile_image.clone())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| avatar_fallback(&seller.username));

    SellerResponse {
        id: seller.id,
        avatar,
        name: seller.display_name(),
        handle: format!("@{}", seller.username),
        verified: profile.map(|p| p.role.is_verified_seller()).unwrap_or(false),
    }
}

/// Main image URL, else the first image in display order.
pub fn primary_image(images: &[product_image::Model]) -> Option<String> {
    images
        .iter()
        .find(|img| img.is_main)
        .or_else(|| images.first())
        .map(|img| img.image.clone())
}

async fn counts_by_product<C, E>(
    conn: &C,
    column: E::Column,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, u64>, DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let rows: Vec<(Uuid, i64)> = E::find()
        .select_only()
        .column(column)
        .column_as(Expr::col(column).count(), "count")
        .filter(column.is_in(ids.iter().copied()))
        .group_by(column)
        .into_tuple()
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(id, count)| (id, count.max(0) as u64))
        .collect())
}

async fn images_by_product<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<product_image::Model>>, DbErr> {
    let mut grouped: HashMap<Uuid, Vec<product_image::Model>> = HashMap::new();
    for img in ProductImage::find()
        .filter(product_image::Column::ProductId.is_in(ids.iter().copied()))
        .order_by_asc(product_image::Column::Order)
        .order_by_asc(product_image::Column::Id)
        .all(conn)
        .await?
    {
        grouped.entry(img.product_id).or_default().push(img);
    }
    Ok(grouped)
}

/// Batch loader for product projections.
///
/// Every aggregate is fetched with one query for the whole page, so projecting
/// N products costs a fixed number of round trips.
pub struct ProductProjector<'a, C> {
    conn: &'a C,
    viewer: Option<Uuid>,
}

impl<'a, C: ConnectionTrait> ProductProjector<'a, C> {
    pub fn new(conn: &'a C, viewer: Option<Uuid>) -> Self {
        Self { conn, viewer }
    }

    pub async fn one(&self, product: product::Model) -> Result<ProductResponse, ServiceError> {
        self.many(vec![product])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("product projection was empty".to_string()))
    }

    pub async fn many(
        &self,
        products: Vec<product::Model>,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();

        let mut images = images_by_product(self.conn, &ids).await?;

        let mut categories: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (link, cat) in ProductCategory::find()
            .filter(product_category::Column::ProductId.is_in(ids.iter().copied()))
            .find_also_related(category::Entity)
            .order_by_asc(product_category::Column::ProductId)
            .all(self.conn)
            .await?
        {
            if let Some(cat) = cat {
                categories.entry(link.product_id).or_default().push(cat.name);
            }
        }
        for names in categories.values_mut() {
            names.sort();
        }

        let mut sizes: HashMap<Uuid, BTreeSet<String>> = HashMap::new();
        for (link, sz) in ProductSize::find()
            .filter(product_size::Column::ProductId.is_in(ids.iter().copied()))
            .find_also_related(size::Entity)
            .all(self.conn)
            .await?
        {
            if let Some(sz) = sz {
                sizes.entry(link.product_id).or_default().insert(sz.name);
            }
        }
        for (variant, sz) in ProductVariant::find()
            .filter(product_variant::Column::ProductId.is_in(ids.iter().copied()))
            .find_also_related(Size)
            .all(self.conn)
            .await?
        {
            if let Some(sz) = sz {
                sizes.entry(variant.product_id).or_default().insert(sz.name);
            }
        }

        let likes =
            counts_by_product::<_, ProductLike>(self.conn, product_like::Column::ProductId, &ids)
                .await?;
        let comments = counts_by_product::<_, ProductComment>(
            self.conn,
            product_comment::Column::ProductId,
            &ids,
        )
        .await?;
        let shares =
            counts_by_product::<_, ProductShare>(self.conn, product_share::Column::ProductId, &ids)
                .await?;

        let liked: HashSet<Uuid> = match self.viewer {
            Some(viewer) => ProductLike::find()
                .filter(product_like::Column::UserId.eq(viewer))
                .filter(product_like::Column::ProductId.is_in(ids.iter().copied()))
                .all(self.conn)
                .await?
                .into_iter()
                .map(|like| like.product_id)
                .collect(),
            None => HashSet::new(),
        };

        let seller_ids: Vec<Uuid> = products
            .iter()
            .filter_map(|p| p.seller_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let sellers: HashMap<Uuid, user::Model> = if seller_ids.is_empty() {
            HashMap::new()
        } else {
            user::Entity::find()
                .filter(user::Column::Id.is_in(seller_ids.iter().copied()))
                .all(self.conn)
                .await?
                .into_iter()
                .map(|u| (u.id, u))
                .collect()
        };
        let profiles: HashMap<Uuid, user_profile::Model> = if seller_ids.is_empty() {
            HashMap::new()
        } else {
            UserProfile::find()
                .filter(user_profile::Column::UserId.is_in(seller_ids.iter().copied()))
                .all(self.conn)
                .await?
                .into_iter()
                .map(|p| (p.user_id, p))
                .collect()
        };

        Ok(products
            .into_iter()
            .map(|p| {
                let imgs = images.remove(&p.id).unwrap_or_default();
                let cats = categories.remove(&p.id).unwrap_or_default();
                let seller = p
                    .seller_id
                    .and_then(|id| sellers.get(&id))
                    .map(|s| seller_card(s, profiles.get(&s.id)));
                let final_price = money(p.final_price);
                let rating = p.average_rating.round_dp(1);

                ProductResponse {
                    id: p.id,
                    name: p.product_name.clone(),
                    product_name: p.product_name,
                    slug: p.slug,
                    description: p.description,
                    gender: p.gender,
                    stock_quantity: p.stock_quantity,
                    sizes: sizes.remove(&p.id).unwrap_or_default().into_iter().collect(),
                    category: cats.first().cloned(),
                    categories: cats,
                    tags: p.tags,
                    base_price: money(p.base_price),
                    discount_percentage: money(p.discount_percentage),
                    final_price,
                    price: final_price,
                    sku: p.sku,
                    status: p.status,
                    is_featured: p.is_featured,
                    views: p.views,
                    average_rating: rating,
                    rating,
                    image: primary_image(&imgs),
                    images: imgs
                        .into_iter()
                        .map(|img| ProductImageResponse {
                            image: img.image,
                            is_main: img.is_main,
                        })
                        .collect(),
                    seller,
                    likes: likes.get(&p.id).copied().unwrap_or(0),
                    comments: comments.get(&p.id).copied().unwrap_or(0),
                    shares: shares.get(&p.id).copied().unwrap_or(0),
                    user_liked: liked.contains(&p.id),
                    created_at: p.created_at,
                    updated_at: p.updated_at,
                }
            })
            .collect())
    }

    /// Compact cards keyed by product id.
    pub async fn summaries(
        &self,
        products: Vec<product::Model>,
    ) -> Result<HashMap<Uuid, ProductSummary>, ServiceError> {
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let images = if ids.is_empty() {
            HashMap::new()
        } else {
            images_by_product(self.conn, &ids).await?
        };

        Ok(products
            .into_iter()
            .map(|p| {
                let image = images.get(&p.id).and_then(|imgs| primary_image(imgs));
                (
                    p.id,
                    ProductSummary {
                        id: p.id,
                        product_name: p.product_name,
                        slug: p.slug,
                        final_price: money(p.final_price),
                        status: p.status,
                        image,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::UserRole;
    use chrono::Utc;

    fn seller(first: &str, last: &str) -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            password_hash: String::new(),
            first_name: first.into(),
            last_name: last.into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn profile(user_id: Uuid, role: UserRole, image: Option<&str>) -> user_profile::Model {
        user_profile::Model {
            id: Uuid::new_v4(),
            user_id,
            role,
            bio: String::new(),
            location: String::new(),
            website: None,
            business_name: None,
            profile_image: image.map(str::to_string),
            cover_image: None,
            phone: None,
            alternate_email: None,
            date_of_birth: None,
            gender: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn image(url: &str, is_main: bool, order: i32) -> product_image::Model {
        product_image::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            image: url.into(),
            alt_text: String::new(),
            is_main,
            order,
        }
    }

    #[test]
    fn seller_without_profile_is_unverified_with_generated_avatar() {
        let s = seller("", "");
        let card = seller_card(&s, None);
        assert_eq!(card.name, "alice");
        assert_eq!(card.handle, "@alice");
        assert!(!card.verified);
        assert_eq!(
            card.avatar,
            "https://ui-avatars.com/api/?name=alice&size=40&background=667eea&color=fff"
        );
    }

    #[test]
    fn seller_role_and_avatar_come_from_profile() {
        let s = seller("Alice", "Liddell");
        let p = profile(s.id, UserRole::Seller, Some("/media/profiles/a.png"));
        let card = seller_card(&s, Some(&p));
        assert_eq!(card.name, "Alice Liddell");
        assert_eq!(card.avatar, "/media/profiles/a.png");
        assert!(card.verified);

        let buyer = profile(s.id, UserRole::Buyer, None);
        assert!(!seller_card(&s, Some(&buyer)).verified);
    }

    #[test]
    fn primary_image_prefers_main() {
        assert_eq!(primary_image(&[]), None);
        let imgs = vec![image("/a.png", false, 0), image("/b.png", true, 1)];
        assert_eq!(primary_image(&imgs).as_deref(), Some("/b.png"));
        let imgs = vec![image("/a.png", false, 0), image("/c.png", false, 1)];
        assert_eq!(primary_image(&imgs).as_deref(), Some("/a.png"));
    }
}
