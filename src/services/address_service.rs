use crate::{
    entities::{address, Address, AddressModel, AddressType},
    errors::{DbErrExt, ServiceError},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_COUNTRY: &str = "India";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAddressInput {
    #[serde(default)]
    pub address_type: AddressType,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(min = 1, max = 255))]
    pub street_address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 1, max = 100))]
    pub country: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateAddressInput {
    pub address_type: Option<AddressType>,
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub street_address: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub country: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub phone: Option<String>,
    pub is_default: Option<bool>,
}

/// Unsets the current default of `kind` for `user_id`, except `keep`.
async fn clear_default<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    kind: AddressType,
    keep: Option<Uuid>,
) -> Result<u64, ServiceError> {
    let mut query = Address::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .filter(address::Column::UserId.eq(user_id))
        .filter(address::Column::AddressType.eq(kind))
        .filter(address::Column::IsDefault.eq(true));
    if let Some(id) = keep {
        query = query.filter(address::Column::Id.ne(id));
    }
    Ok(query.exec(conn).await?.rows_affected)
}

/// Looks up an address owned by `user_id`; anyone else's reads as missing.
pub(crate) async fn find_own<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    id: Uuid,
) -> Result<AddressModel, ServiceError> {
    Address::find_by_id(id)
        .filter(address::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", id)))
}

fn default_conflict(e: sea_orm::DbErr) -> ServiceError {
    if e.is_unique_violation() {
        ServiceError::Conflict("Another default address was set concurrently".to_string())
    } else {
        e.into()
    }
}

/// Billing and shipping addresses
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<AddressModel>, ServiceError> {
        Ok(Address::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_address(&self, user_id: Uuid, id: Uuid) -> Result<AddressModel, ServiceError> {
        find_own(&*self.db, user_id, id).await
    }

    /// Creates an address. A new default replaces the previous default of the same type.
    #[instrument(skip(self, input))]
    pub async fn create_address(
        &self,
        user_id: Uuid,
        input: CreateAddressInput,
    ) -> Result<AddressModel, ServiceError> {
        let txn = self.db.begin().await?;
        if input.is_default {
            clear_default(&txn, user_id, input.address_type, None).await?;
        }
        let created = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            address_type: Set(input.address_type),
            full_name: Set(input.full_name),
            street_address: Set(input.street_address),
            city: Set(input.city),
            state: Set(input.state),
            postal_code: Set(input.postal_code),
            country: Set(input.country.unwrap_or_else(|| DEFAULT_COUNTRY.to_string())),
            phone: Set(input.phone),
            is_default: Set(input.is_default),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(default_conflict)?;
        txn.commit().await?;

        info!("Created address: {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_address(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdateAddressInput,
    ) -> Result<AddressModel, ServiceError> {
        let txn = self.db.begin().await?;
        let existing = find_own(&txn, user_id, id).await?;

        let kind = input.address_type.unwrap_or(existing.address_type);
        let is_default = input.is_default.unwrap_or(existing.is_default);
        if is_default {
            clear_default(&txn, user_id, kind, Some(id)).await?;
        }

        let mut active = existing.into_active_model();
        active.address_type = Set(kind);
        active.is_default = Set(is_default);
        if let Some(v) = input.full_name {
            active.full_name = Set(v);
        }
        if let Some(v) = input.street_address {
            active.street_address = Set(v);
        }
        if let Some(v) = input.city {
            active.city = Set(v);
        }
        if let Some(v) = input.state {
            active.state = Set(v);
        }
        if let Some(v) = input.postal_code {
            active.postal_code = Set(v);
        }
        if let Some(v) = input.country {
            active.country = Set(v);
        }
        if let Some(v) = input.phone {
            active.phone = Set(v);
        }
        let updated = active.update(&txn).await.map_err(default_conflict)?;
        txn.commit().await?;

        info!("Updated address: {}", id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_address(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let existing = find_own(&*self.db, user_id, id).await?;
        existing.into_active_model().delete(&*self.db).await?;
        info!("Deleted address: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateAddressInput {
        serde_json::from_value(serde_json::json!({
            "full_name": "Alice Liddell",
            "street_address": "1 Rabbit Hole",
            "city": "Pune",
            "state": "MH",
            "postal_code": "411001",
            "phone": "9999999999"
        }))
        .unwrap()
    }

    #[test]
    fn defaults_to_non_default_shipping() {
        let parsed = input();
        assert_eq!(parsed.address_type, AddressType::Shipping);
        assert!(!parsed.is_default);
        assert!(parsed.country.is_none());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut parsed = input();
        parsed.city = String::new();
        let errors = parsed.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("city"));
    }
}
