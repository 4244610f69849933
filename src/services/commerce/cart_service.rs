use crate::{
    dto::{CartItemResponse, CartResponse},
    entities::{
        catalog::{product, product_variant, Product, ProductVariant},
        commerce::{cart, cart_item, Cart, CartItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::{
        pricing::{line_total, money, unit_price},
        product_projection::ProductProjector,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Input for adding a line to the caller's cart.
///
/// `cart` is accepted for compatibility and ignored: items always land in the
/// caller's own cart.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddCartItemInput {
    pub product: Uuid,
    pub variant: Option<Uuid>,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: Option<i32>,
    pub cart: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemInput {
    #[validate(range(min = 1, max = 1000))]
    pub quantity: Option<i32>,
    pub variant: Option<Uuid>,
}

/// Shopping cart service. Every operation is scoped to the calling user.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn own_cart(&self, user_id: Uuid) -> Result<Option<cart::Model>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    /// The caller's carts: zero or one.
    #[instrument(skip(self))]
    pub async fn list_carts(&self, user_id: Uuid) -> Result<Vec<CartResponse>, ServiceError> {
        match self.own_cart(user_id).await? {
            Some(cart) => Ok(vec![build_cart_response(&*self.db, cart).await?]),
            None => Ok(Vec::new()),
        }
    }

    /// Returns the caller's cart, creating it on first use.
    ///
    /// The boolean is true when the cart was created by this call.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(
        &self,
        user_id: Uuid,
    ) -> Result<(CartResponse, bool), ServiceError> {
        let existed = self.own_cart(user_id).await?.is_some();
        let cart = ensure_cart(&*self.db, user_id).await?;
        if !existed {
            info!("Created cart {} for user {}", cart.id, user_id);
        }
        Ok((build_cart_response(&*self.db, cart).await?, !existed))
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid, cart_id: Uuid) -> Result<CartResponse, ServiceError> {
        let cart = self.find_own_cart(user_id, cart_id).await?;
        build_cart_response(&*self.db, cart).await
    }

    async fn find_own_cart(&self, user_id: Uuid, cart_id: Uuid) -> Result<cart::Model, ServiceError> {
        Cart::find_by_id(cart_id)
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }

    /// Deletes the caller's cart together with its items.
    #[instrument(skip(self))]
    pub async fn delete_cart(&self, user_id: Uuid, cart_id: Uuid) -> Result<(), ServiceError> {
        let cart = self.find_own_cart(user_id, cart_id).await?;
        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        Cart::delete_by_id(cart.id).exec(&txn).await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        info!("Deleted cart: {}", cart.id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_items(&self, user_id: Uuid) -> Result<Vec<CartItemResponse>, ServiceError> {
        let Some(cart) = self.own_cart(user_id).await? else {
            return Ok(Vec::new());
        };
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::AddedAt)
            .all(&*self.db)
            .await?;
        project_items(&*self.db, items).await
    }

    async fn find_own_item(&self, user_id: Uuid, item_id: Uuid) -> Result<cart_item::Model, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("Cart item {} not found", item_id));
        let cart = self.own_cart(user_id).await?.ok_or_else(not_found)?;
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(not_found)
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartItemResponse, ServiceError> {
        let item = self.find_own_item(user_id, item_id).await?;
        single_item(&*self.db, item).await
    }

    /// Adds a line to the caller's cart, merging with an identical line.
    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddCartItemInput,
    ) -> Result<(CartItemResponse, bool), ServiceError> {
        let quantity = input.quantity.unwrap_or(1);
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ValidationError(format!("Product {} does not exist", input.product)))?;
        if let Some(variant_id) = input.variant {
            ensure_variant_of(&txn, variant_id, product.id).await?;
        }

        // Ownership comes from the token, never from the payload.
        let cart = ensure_cart(&txn, user_id).await?;

        let mut same_line = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id));
        same_line = match input.variant {
            Some(variant_id) => same_line.filter(cart_item::Column::VariantId.eq(variant_id)),
            None => same_line.filter(cart_item::Column::VariantId.is_null()),
        };

        let (item, created) = match same_line.one(&txn).await? {
            Some(existing) => {
                let merged = existing.quantity.saturating_add(quantity);
                let mut active = existing.into_active_model();
                active.quantity = Set(merged);
                (active.update(&txn).await?, false)
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    variant_id: Set(input.variant),
                    quantity: Set(quantity),
                    added_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?;
                (item, true)
            }
        };
        touch_cart(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: item.cart_id,
                item_id: item.id,
            })
            .await;
        info!("Added product {} to cart {}", item.product_id, item.cart_id);

        Ok((single_item(&*self.db, item).await?, created))
    }

    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        input: UpdateCartItemInput,
    ) -> Result<CartItemResponse, ServiceError> {
        let item = self.find_own_item(user_id, item_id).await?;
        if let Some(variant_id) = input.variant {
            ensure_variant_of(&*self.db, variant_id, item.product_id).await?;
        }

        let mut active = item.into_active_model();
        if let Some(quantity) = input.quantity {
            active.quantity = Set(quantity);
        }
        if let Some(variant_id) = input.variant {
            active.variant_id = Set(Some(variant_id));
        }
        let item = active.update(&*self.db).await?;
        single_item(&*self.db, item).await
    }

    #[instrument(skip(self))]
    pub async fn delete_item(&self, user_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let item = self.find_own_item(user_id, item_id).await?;
        CartItem::delete_by_id(item.id).exec(&*self.db).await?;
        info!("Removed item {} from cart {}", item.id, item.cart_id);
        Ok(())
    }
}

/// Finds or creates the user's cart; the unique `user_id` settles races.
pub(crate) async fn ensure_cart<C>(conn: &C, user_id: Uuid) -> Result<cart::Model, ServiceError>
where
    C: ConnectionTrait + TransactionTrait,
{
    crate::db::get_or_create::<_, Cart, cart::ActiveModel, _>(
        conn,
        cart::Column::UserId,
        user_id,
        || {
            let now = Utc::now();
            cart::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                created_at: Set(now),
                updated_at: Set(now),
            }
        },
    )
    .await
}

async fn touch_cart<C: ConnectionTrait>(conn: &C, cart: cart::Model) -> Result<(), ServiceError> {
    let mut active = cart.into_active_model();
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}

async fn ensure_variant_of<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    product_id: Uuid,
) -> Result<product_variant::Model, ServiceError> {
    let variant = ProductVariant::find_by_id(variant_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::ValidationError(format!("Variant {} does not exist", variant_id)))?;
    if variant.product_id != product_id {
        return Err(ServiceError::ValidationError(format!(
            "Variant {} does not belong to product {}",
            variant_id, product_id
        )));
    }
    Ok(variant)
}

async fn single_item<C: ConnectionTrait>(
    conn: &C,
    item: cart_item::Model,
) -> Result<CartItemResponse, ServiceError> {
    project_items(conn, vec![item])
        .await?
        .pop()
        .ok_or_else(|| ServiceError::InternalError("cart item projection was empty".to_string()))
}

/// Projects cart lines at current prices.
pub(crate) async fn project_items<C: ConnectionTrait>(
    conn: &C,
    items: Vec<cart_item::Model>,
) -> Result<Vec<CartItemResponse>, ServiceError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let variant_ids: Vec<Uuid> = items.iter().filter_map(|i| i.variant_id).collect();

    let products: Vec<product::Model> = Product::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?;
    let prices: HashMap<Uuid, Decimal> = products.iter().map(|p| (p.id, p.final_price)).collect();
    let adjustments: HashMap<Uuid, Decimal> = ProductVariant::find()
        .filter(product_variant::Column::Id.is_in(variant_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|v| (v.id, v.price_adjustment))
        .collect();
    let summaries = ProductProjector::new(conn, None).summaries(products).await?;

    items
        .into_iter()
        .map(|item| {
            let final_price = prices.get(&item.product_id).copied().ok_or_else(|| {
                ServiceError::InternalError(format!("product {} vanished", item.product_id))
            })?;
            let summary = summaries
                .get(&item.product_id)
                .cloned()
                .ok_or_else(|| {
                    ServiceError::InternalError(format!("product {} vanished", item.product_id))
                })?;
            let adjustment = item.variant_id.and_then(|v| adjustments.get(&v).copied());
            let unit = unit_price(final_price, adjustment);
            Ok(CartItemResponse {
                id: item.id,
                cart: item.cart_id,
                product: summary,
                variant: item.variant_id,
                quantity: item.quantity,
                unit_price: unit,
                line_total: line_total(unit, item.quantity),
                added_at: item.added_at,
            })
        })
        .collect()
}

async fn build_cart_response<C: ConnectionTrait>(
    conn: &C,
    cart: cart::Model,
) -> Result<CartResponse, ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::AddedAt)
        .all(conn)
        .await?;
    let items = project_items(conn, items).await?;

    let item_count = items.iter().map(|i| i64::from(i.quantity)).sum();
    let subtotal = money(items.iter().map(|i| i.line_total).sum());

    Ok(CartResponse {
        id: cart.id,
        user: cart.user_id,
        items,
        item_count,
        subtotal,
        created_at: cart.created_at,
        updated_at: cart.updated_at,
    })
}

/// Removes every line from a cart.
pub(crate) async fn clear_items<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<u64, ServiceError> {
    let result = CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_item_quantity_rules() {
        let ok: AddCartItemInput = serde_json::from_value(serde_json::json!({
            "product": Uuid::new_v4(),
            "cart": Uuid::new_v4()
        }))
        .unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.quantity, None);

        let zero: AddCartItemInput = serde_json::from_value(serde_json::json!({
            "product": Uuid::new_v4(),
            "quantity": 0
        }))
        .unwrap();
        assert!(zero.validate().is_err());
    }
}
