use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order;
use crate::entities::shipping_address::{self, AddressType};
use crate::errors::ServiceError;

static CONTACT_PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\d{6,14}$").expect("contact phone pattern compiles"));

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(regex(path = "CONTACT_PHONE_RE", message = "Invalid contact phone"))]
    pub phone: String,
    pub address_type: AddressType,
    #[validate(length(min = 1, max = 200))]
    pub building: String,
    #[validate(length(max = 50))]
    pub floor: Option<String>,
    #[validate(length(max = 200))]
    pub landmark: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    #[validate(length(min = 1, message = "Full address is required"))]
    pub full_address: String,
}

/// Customer shipping addresses. Every call is scoped to the owner.
#[derive(Clone)]
pub struct AddressService {
    db_pool: Arc<DbPool>,
}

impl AddressService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<shipping_address::Model>, ServiceError> {
        Ok(shipping_address::Entity::find()
            .filter(shipping_address::Column::CustomerId.eq(customer_id))
            .order_by_desc(shipping_address::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    pub async fn get(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> Result<shipping_address::Model, ServiceError> {
        shipping_address::Entity::find_by_id(address_id)
            .filter(shipping_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shipping address not found".to_string()))
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        customer_id: Uuid,
        request: AddressRequest,
    ) -> Result<shipping_address::Model, ServiceError> {
        request.validate()?;
        let now = Utc::now();
        let created = shipping_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            name: Set(request.name),
            phone: Set(request.phone),
            address_type: Set(request.address_type),
            building: Set(request.building),
            floor: Set(request.floor),
            landmark: Set(request.landmark),
            latitude: Set(request.latitude),
            longitude: Set(request.longitude),
            full_address: Set(request.full_address),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;
        info!(address_id = %created.id, "shipping address created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
        request: AddressRequest,
    ) -> Result<shipping_address::Model, ServiceError> {
        request.validate()?;
        let existing = self.get(customer_id, address_id).await?;

        let mut active: shipping_address::ActiveModel = existing.into();
        active.name = Set(request.name);
        active.phone = Set(request.phone);
        active.address_type = Set(request.address_type);
        active.building = Set(request.building);
        active.floor = Set(request.floor);
        active.landmark = Set(request.landmark);
        active.latitude = Set(request.latitude);
        active.longitude = Set(request.longitude);
        active.full_address = Set(request.full_address);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db_pool).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, customer_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let referenced = order::Entity::find()
            .filter(order::Column::ShippingAddressId.eq(address_id))
            .count(&*self.db_pool)
            .await?;
        if referenced > 0 {
            return Err(ServiceError::Conflict(
                "Shipping address is used by an existing order".to_string(),
            ));
        }

        let res = shipping_address::Entity::delete_many()
            .filter(shipping_address::Column::Id.eq(address_id))
            .filter(shipping_address::Column::CustomerId.eq(customer_id))
            .exec(&*self.db_pool)
            .await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound(
                "Shipping address not found".to_string(),
            ));
        }
        Ok(())
    }
}
