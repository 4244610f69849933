use crate::{
    dto::{CouponResponse, CouponValidationResponse},
    entities::{
        commerce::{coupon, Coupon, DiscountType},
        UserRole,
    },
    errors::{DbErrExt, ServiceError},
    events::{Event, EventSender},
    services::{commerce::pricing, profile_service::role_of},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_decimal_min_zero(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("decimal_min_zero"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCouponInput {
    #[validate(length(min = 3, max = 50))]
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    #[validate(custom = "validate_decimal_min_zero")]
    pub discount_value: Decimal,
    #[validate(custom = "validate_decimal_min_zero")]
    pub minimum_purchase: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: DateTime<Utc>,
    pub is_active: Option<bool>,
}

/// Coupon codes are stored and matched upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Checks whether `coupon` can be applied to `subtotal` at `now`.
pub fn check_usable(
    coupon: &coupon::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !coupon.is_active {
        return Err(ServiceError::ValidationError(format!(
            "Coupon {} is not active",
            coupon.code
        )));
    }
    if now < coupon.valid_from || now > coupon.valid_to {
        return Err(ServiceError::ValidationError(format!(
            "Coupon {} is not valid at this time",
            coupon.code
        )));
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(ServiceError::ValidationError(format!(
                "Coupon {} has reached its usage limit",
                coupon.code
            )));
        }
    }
    if subtotal < coupon.minimum_purchase {
        return Err(ServiceError::ValidationError(format!(
            "Coupon {} requires a minimum purchase of {}",
            coupon.code,
            pricing::money(coupon.minimum_purchase)
        )));
    }
    Ok(())
}

async fn find_by_code<C: ConnectionTrait>(conn: &C, code: &str) -> Result<coupon::Model, ServiceError> {
    let code = normalize_code(code);
    Coupon::find()
        .filter(coupon::Column::Code.eq(code.as_str()))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))
}

/// Applies a coupon inside the caller's transaction and counts the use.
///
/// The usage counter is bumped with a guarded update, so concurrent
/// checkouts cannot exceed the limit.
pub(crate) async fn redeem<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    subtotal: Decimal,
) -> Result<(coupon::Model, Decimal), ServiceError> {
    let coupon = find_by_code(conn, code).await?;
    check_usable(&coupon, subtotal, Utc::now())?;

    let bumped = Coupon::update_many()
        .col_expr(
            coupon::Column::UsedCount,
            Expr::col(coupon::Column::UsedCount).add(1),
        )
        .filter(coupon::Column::Id.eq(coupon.id))
        .filter(
            Condition::any()
                .add(coupon::Column::UsageLimit.is_null())
                .add(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::UsageLimit))),
        )
        .exec(conn)
        .await?;
    if bumped.rows_affected == 0 {
        return Err(ServiceError::ValidationError(format!(
            "Coupon {} has reached its usage limit",
            coupon.code
        )));
    }

    let discount = pricing::coupon_discount(coupon.discount_type, coupon.discount_value, subtotal);
    Ok((coupon, discount))
}

fn coupon_response(c: coupon::Model) -> CouponResponse {
    CouponResponse {
        id: c.id,
        code: c.code,
        description: c.description,
        discount_type: c.discount_type,
        discount_value: pricing::money(c.discount_value),
        minimum_purchase: pricing::money(c.minimum_purchase),
        usage_limit: c.usage_limit,
        used_count: c.used_count,
        valid_from: c.valid_from,
        valid_to: c.valid_to,
        is_active: c.is_active,
    }
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a coupon. Admins only.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(
        &self,
        actor: Uuid,
        input: CreateCouponInput,
    ) -> Result<CouponResponse, ServiceError> {
        if role_of(&*self.db, actor).await? != UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Only administrators can create coupons".to_string(),
            ));
        }

        let valid_from = input.valid_from.unwrap_or_else(Utc::now);
        if input.valid_to <= valid_from {
            return Err(ServiceError::ValidationError(
                "valid_to must be after valid_from".to_string(),
            ));
        }
        if input.discount_type == DiscountType::Percentage
            && input.discount_value > Decimal::ONE_HUNDRED
        {
            return Err(ServiceError::ValidationError(
                "A percentage discount cannot exceed 100".to_string(),
            ));
        }

        let code = normalize_code(&input.code);
        let created = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            description: Set(input.description),
            discount_type: Set(input.discount_type),
            discount_value: Set(pricing::money(input.discount_value)),
            minimum_purchase: Set(pricing::money(input.minimum_purchase.unwrap_or(Decimal::ZERO))),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            valid_from: Set(valid_from),
            valid_to: Set(input.valid_to),
            is_active: Set(input.is_active.unwrap_or(true)),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::Conflict(format!("Coupon {} already exists", code))
            } else {
                e.into()
            }
        })?;

        self.event_sender
            .send_or_log(Event::CouponCreated(created.code.clone()))
            .await;
        info!("Created coupon: {}", created.code);
        Ok(coupon_response(created))
    }

    /// Reports the discount a coupon would give on `subtotal` without using it.
    #[instrument(skip(self))]
    pub async fn validate_coupon(
        &self,
        code: &str,
        subtotal: Decimal,
    ) -> Result<CouponValidationResponse, ServiceError> {
        let coupon = find_by_code(&*self.db, code).await?;
        check_usable(&coupon, subtotal, Utc::now())?;
        Ok(CouponValidationResponse {
            discount_amount: pricing::coupon_discount(
                coupon.discount_type,
                coupon.discount_value,
                subtotal,
            ),
            subtotal: pricing::money(subtotal),
            code: coupon.code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(kind: DiscountType, value: Decimal) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "WELCOME10".into(),
            description: String::new(),
            discount_type: kind,
            discount_value: value,
            minimum_purchase: dec!(50.00),
            usage_limit: Some(2),
            used_count: 0,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(1),
            is_active: true,
        }
    }

    #[test]
    fn usable_coupon_passes() {
        let c = coupon(DiscountType::Percentage, dec!(10));
        assert!(check_usable(&c, dec!(80.00), Utc::now()).is_ok());
    }

    #[test]
    fn rejects_inactive_expired_exhausted_and_small_orders() {
        let now = Utc::now();

        let mut c = coupon(DiscountType::Fixed, dec!(5));
        c.is_active = false;
        assert_matches!(check_usable(&c, dec!(80), now), Err(ServiceError::ValidationError(_)));

        let c = coupon(DiscountType::Fixed, dec!(5));
        assert_matches!(
            check_usable(&c, dec!(80), now + Duration::days(2)),
            Err(ServiceError::ValidationError(msg)) if msg.contains("not valid")
        );

        let mut c = coupon(DiscountType::Fixed, dec!(5));
        c.used_count = 2;
        assert_matches!(
            check_usable(&c, dec!(80), now),
            Err(ServiceError::ValidationError(msg)) if msg.contains("usage limit")
        );

        let c = coupon(DiscountType::Fixed, dec!(5));
        assert_matches!(
            check_usable(&c, dec!(49.99), now),
            Err(ServiceError::ValidationError(msg)) if msg.contains("minimum purchase of 50.00")
        );
    }

    #[test]
    fn codes_are_case_insensitive() {
        assert_eq!(normalize_code("  welcome10 "), "WELCOME10");
    }
}
