use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{cart, cart_item, product};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku_no: String,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    pub cart_id: Uuid,
    pub items: Vec<CartLine>,
    pub total_quantity: i64,
    pub total_price: Decimal,
}

/// Selling price after the flat discount.
pub fn unit_price(product: &product::Model) -> Decimal {
    product.price - product.discount
}

#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
}

impl CartService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn cart_for<C: ConnectionTrait>(
        conn: &C,
        customer_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = cart::Entity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        Ok(cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?)
    }

    /// Drops every line from the customer's cart, if one exists.
    pub async fn clear<C: ConnectionTrait>(conn: &C, customer_id: Uuid) -> Result<u64, ServiceError> {
        let Some(existing) = cart::Entity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
        else {
            return Ok(0);
        };

        let res = cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(existing.id))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    #[instrument(skip(self))]
    pub async fn view(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let db = &*self.db_pool;
        let cart = Self::cart_for(db, customer_id).await?;

        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (item, product) in rows {
            let Some(product) = product else { continue };
            let price = unit_price(&product);
            items.push(CartLine {
                id: item.id,
                product_id: product.id,
                sku_no: product.sku_no,
                title: product.title,
                unit_price: price,
                quantity: item.quantity,
                line_total: price * Decimal::from(item.quantity),
                is_available: product.is_available && product.is_active,
            });
        }

        let total_quantity = items.iter().map(|l| i64::from(l.quantity)).sum();
        let total_price = items.iter().map(|l| l.line_total).sum();
        Ok(CartView {
            cart_id: cart.id,
            items,
            total_quantity,
            total_price,
        })
    }

    /// Sets the line's quantity, creating the line when absent.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        request: AddToCartRequest,
    ) -> Result<CartView, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let product = product::Entity::find_by_id(request.product_id)
            .filter(product::Column::IsActive.eq(true))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        if product.stock_quantity < request.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} units of {} available",
                product.stock_quantity, product.title
            )));
        }

        let cart = Self::cart_for(db, customer_id).await?;
        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(db)
            .await?;

        match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(request.quantity);
                active.update(db).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(request.quantity),
                    created_at: Set(Utc::now()),
                }
                .insert(db)
                .await?;
            }
        }

        info!(cart_id = %cart.id, "cart updated");
        self.view(customer_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let db = &*self.db_pool;
        let cart = Self::cart_for(db, customer_id).await?;

        let res = cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound("Cart item not found".to_string()));
        }

        self.view(customer_id).await
    }
}
