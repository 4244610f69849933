use crate::{
    db::{insert_with_savepoint, MAX_INSERT_ATTEMPTS},
    dto::{OrderItemResponse, OrderResponse},
    entities::{
        catalog::{product, product_variant, Product, ProductStatus, ProductVariant},
        commerce::{
            cart, cart_item, order, order_item, Cart, CartItem, Order, OrderItem, OrderStatus,
            PaymentStatus,
        },
    },
    errors::{DbErrExt, ServiceError},
    events::{Event, EventSender},
    services::{
        address_service,
        commerce::{
            cart_service::clear_items,
            coupon_service,
            pricing::{self, line_total, money, unit_price},
            slug::random_code,
        },
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

const ORDER_NUMBER_PREFIX: &str = "WU-";
const ORDER_NUMBER_LEN: usize = 10;

fn validate_decimal_min_zero(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("decimal_min_zero"));
    }
    Ok(())
}

/// Order placed with client-computed totals.
///
/// Missing amounts default to zero; a missing `total_amount` is derived from
/// the other four.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    #[validate(custom = "validate_decimal_min_zero")]
    pub subtotal: Option<Decimal>,
    #[validate(custom = "validate_decimal_min_zero")]
    pub tax_amount: Option<Decimal>,
    #[validate(custom = "validate_decimal_min_zero")]
    pub shipping_amount: Option<Decimal>,
    #[validate(custom = "validate_decimal_min_zero")]
    pub discount_amount: Option<Decimal>,
    #[validate(custom = "validate_decimal_min_zero")]
    pub total_amount: Option<Decimal>,
    pub billing_address: Option<Uuid>,
    pub shipping_address: Option<Uuid>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderInput {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CheckoutInput {
    #[validate(length(min = 1, max = 50))]
    pub coupon_code: Option<String>,
    pub billing_address: Option<Uuid>,
    pub shipping_address: Option<Uuid>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderItemInput {
    pub order: Uuid,
    pub product: Uuid,
    pub variant: Option<Uuid>,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

/// Filters for the order listing
#[derive(Debug, Clone, Default)]
pub struct OrderListQuery {
    pub page: u64,
    pub per_page: u64,
}

/// A cart line priced for checkout
struct PricedLine {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
}

fn order_number() -> String {
    format!("{}{}", ORDER_NUMBER_PREFIX, random_code(ORDER_NUMBER_LEN))
}

fn item_response(item: order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        id: item.id,
        order: item.order_id,
        product: item.product_id,
        variant: item.variant_id,
        quantity: item.quantity,
        unit_price: money(item.unit_price),
        total_price: money(item.total_price),
    }
}

fn order_response(o: order::Model, items: Vec<order_item::Model>) -> OrderResponse {
    OrderResponse {
        id: o.id,
        order_number: o.order_number,
        user: o.user_id,
        status: o.status,
        payment_status: o.payment_status,
        subtotal: money(o.subtotal),
        tax_amount: money(o.tax_amount),
        shipping_amount: money(o.shipping_amount),
        discount_amount: money(o.discount_amount),
        total_amount: money(o.total_amount),
        billing_address: o.billing_address_id,
        shipping_address: o.shipping_address_id,
        coupon_code: o.coupon_code,
        notes: o.notes,
        tracking_number: o.tracking_number,
        order_items: items.into_iter().map(item_response).collect(),
        created_at: o.created_at,
        updated_at: o.updated_at,
    }
}

/// Addresses named on an order must belong to the caller.
async fn own_address<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    field: &str,
    id: Option<Uuid>,
) -> Result<Option<Uuid>, ServiceError> {
    match id {
        None => Ok(None),
        Some(id) => address_service::find_own(conn, user_id, id)
            .await
            .map(|a| Some(a.id))
            .map_err(|e| match e {
                ServiceError::NotFound(_) => {
                    ServiceError::ValidationError(format!("{}: address {} does not exist", field, id))
                }
                other => other,
            }),
    }
}

/// Inserts the order, drawing a fresh order number on each collision.
async fn insert_order(
    txn: &DatabaseTransaction,
    build: impl Fn(String) -> order::ActiveModel,
) -> Result<order::Model, ServiceError> {
    for _ in 0..MAX_INSERT_ATTEMPTS {
        let number = order_number();
        match insert_with_savepoint(txn, build(number.clone())).await {
            Ok(created) => return Ok(created),
            Err(e) if e.is_unique_violation() => {
                debug!("Order number {} taken, drawing another", number);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ServiceError::Conflict(
        "Could not allocate an order number; please retry".to_string(),
    ))
}

/// Price of one unit of `product_id` (optionally as `variant_id`) right now.
async fn current_unit_price<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    variant_id: Option<Uuid>,
) -> Result<Decimal, ServiceError> {
    let product = Product::find_by_id(product_id).one(conn).await?.ok_or_else(|| {
        ServiceError::ValidationError(format!("product: product {} does not exist", product_id))
    })?;
    let adjustment = match variant_id {
        None => None,
        Some(variant_id) => {
            let variant = ProductVariant::find_by_id(variant_id)
                .filter(product_variant::Column::ProductId.eq(product_id))
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "variant: variant {} does not belong to product {}",
                        variant_id, product_id
                    ))
                })?;
            Some(variant.price_adjustment)
        }
    };
    Ok(unit_price(product.final_price, adjustment))
}

/// Decrements stock for every line, failing the whole checkout on any shortfall.
///
/// Returns products whose stock fell to or below their low-stock threshold.
async fn reserve_stock(
    txn: &DatabaseTransaction,
    lines: &[PricedLine],
) -> Result<Vec<(Uuid, i32, i32)>, ServiceError> {
    let mut per_product: BTreeMap<Uuid, i32> = BTreeMap::new();
    let mut per_variant: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in lines {
        *per_product.entry(line.product_id).or_default() += line.quantity;
        if let Some(v) = line.variant_id {
            *per_variant.entry(v).or_default() += line.quantity;
        }
    }

    for (&variant_id, &qty) in &per_variant {
        let updated = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).sub(qty),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::StockQuantity.gte(qty))
            .exec(txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock for variant {}",
                variant_id
            )));
        }
    }

    let mut low = Vec::new();
    for (&product_id, &qty) in &per_product {
        let updated = Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).sub(qty),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::StockQuantity.gte(qty))
            .exec(txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock for product {}",
                product_id
            )));
        }

        Product::update_many()
            .col_expr(product::Column::Status, Expr::value(ProductStatus::SoldOut))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::StockQuantity.eq(0))
            .exec(txn)
            .await?;

        if let Some(p) = Product::find_by_id(product_id).one(txn).await? {
            if p.stock_quantity <= p.low_stock_threshold {
                low.push((p.id, p.stock_quantity, p.low_stock_threshold));
            }
        }
    }
    Ok(low)
}

/// Orders, order lines and checkout
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
    shipping_flat_rate: Decimal,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        tax_rate: Decimal,
        shipping_flat_rate: Decimal,
    ) -> Self {
        Self {
            db,
            event_sender,
            tax_rate,
            shipping_flat_rate,
        }
    }

    async fn find_own<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn with_items(&self, o: order::Model) -> Result<OrderResponse, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(o.id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(order_response(o, items))
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        query: OrderListQuery,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_asc(order::Column::Id)
            .paginate(&*self.db, query.per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(query.page.saturating_sub(1)).await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            for item in OrderItem::find()
                .filter(order_item::Column::OrderId.is_in(ids))
                .order_by_asc(order_item::Column::Id)
                .all(&*self.db)
                .await?
            {
                items.entry(item.order_id).or_default().push(item);
            }
        }

        let projected = orders
            .into_iter()
            .map(|o| {
                let lines = items.remove(&o.id).unwrap_or_default();
                order_response(o, lines)
            })
            .collect();
        Ok((projected, total))
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let o = Self::find_own(&*self.db, user_id, order_id).await?;
        self.with_items(o).await
    }

    /// Creates an order with the totals the client supplied.
    #[instrument(skip(self, input))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;
        let billing = own_address(&txn, user_id, "billing_address", input.billing_address).await?;
        let shipping = own_address(&txn, user_id, "shipping_address", input.shipping_address).await?;

        let subtotal = money(input.subtotal.unwrap_or_default());
        let tax = money(input.tax_amount.unwrap_or_default());
        let ship = money(input.shipping_amount.unwrap_or_default());
        let discount = money(input.discount_amount.unwrap_or_default());
        let total = input
            .total_amount
            .map(money)
            .unwrap_or_else(|| pricing::order_total(subtotal, tax, ship, discount));

        let now = Utc::now();
        let created = insert_order(&txn, |number| order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_number: Set(number),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            subtotal: Set(subtotal),
            tax_amount: Set(tax),
            shipping_amount: Set(ship),
            discount_amount: Set(discount),
            total_amount: Set(total),
            billing_address_id: Set(billing),
            shipping_address_id: Set(shipping),
            coupon_code: Set(None),
            notes: Set(input.notes.clone()),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(created.id))
            .await;
        info!("Created order: {} ({})", created.id, created.order_number);
        Ok(order_response(created, Vec::new()))
    }

    #[instrument(skip(self, input))]
    pub async fn update_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        input: UpdateOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        let existing = Self::find_own(&*self.db, user_id, order_id).await?;
        let old_status = existing.status;

        let mut active = existing.into_active_model();
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        if let Some(payment) = input.payment_status {
            active.payment_status = Set(payment);
        }
        if let Some(tracking) = input.tracking_number {
            active.tracking_number = Set(Some(tracking).filter(|t| !t.is_empty()));
        }
        if let Some(notes) = input.notes {
            active.notes = Set(notes);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        if updated.status != old_status {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_status.as_str().to_string(),
                    new_status: updated.status.as_str().to_string(),
                })
                .await;
        }
        info!("Updated order: {}", order_id);
        self.with_items(updated).await
    }

    /// Deletes an order that never progressed past pending, or was cancelled.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, user_id: Uuid, order_id: Uuid) -> Result<(), ServiceError> {
        let existing = Self::find_own(&*self.db, user_id, order_id).await?;
        if !existing.status.is_deletable() {
            return Err(ServiceError::Conflict(format!(
                "Order {} is {} and cannot be deleted",
                existing.order_number,
                existing.status.as_str()
            )));
        }
        let removed = Order::delete_many()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in([OrderStatus::Pending, OrderStatus::Cancelled]))
            .exec(&*self.db)
            .await?;
        if removed.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} changed state and cannot be deleted",
                existing.order_number
            )));
        }

        self.event_sender
            .send_or_log(Event::OrderDeleted(order_id))
            .await;
        info!("Deleted order: {}", order_id);
        Ok(())
    }

    /// Turns the caller's cart into an order.
    ///
    /// Lines are priced now and frozen on the order. Stock, coupon usage and the
    /// cart are all updated in the same transaction.
    #[instrument(skip(self, input))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        input: CheckoutInput,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Your cart is empty".to_string()))?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::AddedAt)
            .all(&txn)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Your cart is empty".to_string()));
        }

        let billing = own_address(&txn, user_id, "billing_address", input.billing_address).await?;
        let shipping = own_address(&txn, user_id, "shipping_address", input.shipping_address).await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let unit = current_unit_price(&txn, item.product_id, item.variant_id).await?;
            lines.push(PricedLine {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: unit,
                total_price: line_total(unit, item.quantity),
            });
        }
        let low_stock = reserve_stock(&txn, &lines).await?;

        let subtotal = money(lines.iter().map(|l| l.total_price).sum());
        let (coupon_code, discount) = match input.coupon_code.as_deref() {
            Some(code) => {
                let (coupon, discount) = coupon_service::redeem(&txn, code, subtotal).await?;
                (Some(coupon.code), discount)
            }
            None => (None, Decimal::ZERO),
        };
        let tax = pricing::tax(subtotal, self.tax_rate);
        let ship = money(self.shipping_flat_rate);
        let total = pricing::order_total(subtotal, tax, ship, discount);

        let now = Utc::now();
        let created = insert_order(&txn, |number| order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_number: Set(number),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            subtotal: Set(subtotal),
            tax_amount: Set(tax),
            shipping_amount: Set(ship),
            discount_amount: Set(discount),
            total_amount: Set(total),
            billing_address_id: Set(billing),
            shipping_address_id: Set(shipping),
            coupon_code: Set(coupon_code.clone()),
            notes: Set(input.notes.clone()),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await?;

        let rows: Vec<order_item::ActiveModel> = lines
            .iter()
            .map(|l| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(created.id),
                product_id: Set(l.product_id),
                variant_id: Set(l.variant_id),
                quantity: Set(l.quantity),
                unit_price: Set(l.unit_price),
                total_price: Set(l.total_price),
            })
            .collect();
        OrderItem::insert_many(rows).exec_without_returning(&txn).await?;

        clear_items(&txn, cart.id).await?;
        let mut touched = cart.into_active_model();
        touched.updated_at = Set(now);
        let cart = touched.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                order_id: created.id,
                total,
                coupon: coupon_code,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCreated(created.id))
            .await;
        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        for (product_id, stock_quantity, threshold) in low_stock {
            self.event_sender
                .send_or_log(Event::LowStock {
                    product_id,
                    stock_quantity,
                    threshold,
                })
                .await;
        }

        info!(
            "Checkout completed: order {} created from cart {}",
            created.order_number, cart.id
        );
        self.with_items(created).await
    }

    /// Lines of all the caller's orders.
    #[instrument(skip(self))]
    pub async fn list_order_items(&self, user_id: Uuid) -> Result<Vec<OrderItemResponse>, ServiceError> {
        let own: Vec<Uuid> = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();
        if own.is_empty() {
            return Ok(Vec::new());
        }
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(own))
            .order_by_asc(order_item::Column::OrderId)
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(item_response)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_order_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<OrderItemResponse, ServiceError> {
        let item = OrderItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order item {} not found", item_id)))?;
        Self::find_own(&*self.db, user_id, item.order_id)
            .await
            .map_err(|_| ServiceError::NotFound(format!("Order item {} not found", item_id)))?;
        Ok(item_response(item))
    }

    /// Adds a line to one of the caller's orders, priced at the current product price.
    #[instrument(skip(self, input))]
    pub async fn create_order_item(
        &self,
        user_id: Uuid,
        input: CreateOrderItemInput,
    ) -> Result<OrderItemResponse, ServiceError> {
        Self::find_own(&*self.db, user_id, input.order)
            .await
            .map_err(|e| match e {
                ServiceError::NotFound(_) => ServiceError::ValidationError(format!(
                    "order: order {} does not exist",
                    input.order
                )),
                other => other,
            })?;
        let unit = current_unit_price(&*self.db, input.product, input.variant).await?;

        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(input.order),
            product_id: Set(input.product),
            variant_id: Set(input.variant),
            quantity: Set(input.quantity),
            unit_price: Set(unit),
            total_price: Set(line_total(unit, input.quantity)),
        }
        .insert(&*self.db)
        .await?;

        info!("Added item {} to order {}", item.id, item.order_id);
        Ok(item_response(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_numbers_have_prefix_and_length() {
        let n = order_number();
        assert!(n.starts_with("WU-"));
        assert_eq!(n.len(), 13);
        assert_ne!(order_number(), order_number());
    }

    #[test]
    fn negative_totals_are_rejected() {
        let input = CreateOrderInput {
            subtotal: Some(dec!(-1)),
            ..Default::default()
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("subtotal"));
        assert!(CreateOrderInput::default().validate().is_ok());
    }

    #[test]
    fn order_item_quantity_must_be_positive() {
        let input = CreateOrderItemInput {
            order: Uuid::new_v4(),
            product: Uuid::new_v4(),
            variant: None,
            quantity: 0,
        };
        assert!(input.validate().is_err());
    }
}
