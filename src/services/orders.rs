use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentMethod};
use crate::entities::{order_item, payment, product, shipping_address};
use crate::errors::ServiceError;
use crate::events::{emit, Event, EventSender};
use crate::services::cart::CartService;
use crate::services::sequences::{self, SequenceKind};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Unit price shown to the customer; stored as the line's snapshot.
    pub item_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub shipping_address_id: Uuid,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub payment_method: PaymentMethod,
    pub total_amount: Decimal,
}

/// Order header with its lines and payment, if recorded.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub payment: Option<payment::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Places an order. Order, lines, stock decrements and the cart clear
    /// commit together or not at all.
    #[instrument(skip(self, request), fields(customer_id = %customer_id, items = request.items.len()))]
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        if request.total_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Total amount cannot be negative".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        shipping_address::Entity::find_by_id(request.shipping_address_id)
            .filter(shipping_address::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shipping address not found".to_string()))?;

        let order_number = sequences::next_code(&txn, SequenceKind::Order).await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(customer_id),
            shipping_address_id: Set(request.shipping_address_id),
            total_amount: Set(request.total_amount),
            status: Set(OrderStatus::Pending),
            payment_method: Set(request.payment_method),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let mut items = Vec::with_capacity(request.items.len());
        let mut warehouse_ids = BTreeSet::new();

        for line in &request.items {
            let product = product::Entity::find_by_id(line.product_id)
                .filter(product::Column::IsActive.eq(true))
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for {} must be greater than zero",
                    product.title
                )));
            }
            if line.item_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Price for {} cannot be negative",
                    product.title
                )));
            }
            if product.stock_quantity < line.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} units of {} available",
                    product.stock_quantity, product.title
                )));
            }

            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                warehouse_id: Set(product.warehouse_id),
                product_id: Set(product.id),
                quantity: Set(line.quantity),
                item_price: Set(line.item_price),
            }
            .insert(&txn)
            .await?;

            // guarded decrement: a concurrent writer that got there first
            // leaves zero rows matched
            let res = product::Entity::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).sub(line.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product.id))
                .filter(product::Column::StockQuantity.gte(line.quantity))
                .exec(&txn)
                .await?;
            if res.rows_affected != 1 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} units of {} available",
                    product.stock_quantity, product.title
                )));
            }

            product::Entity::update_many()
                .col_expr(
                    product::Column::IsAvailable,
                    Expr::col(product::Column::StockQuantity).gt(0),
                )
                .filter(product::Column::Id.eq(product.id))
                .exec(&txn)
                .await?;

            warehouse_ids.insert(product.warehouse_id);
            items.push(item);
        }

        CartService::clear(&txn, customer_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, order_number = %order_number, "Order placed");
        counter!("orders.placed", 1);
        histogram!("orders.items_per_order", items.len() as f64);

        emit(
            &self.event_sender,
            Event::OrderPlaced {
                order_id,
                order_number,
                customer_id,
                warehouse_ids: warehouse_ids.into_iter().collect(),
            },
        )
        .await;

        Ok(OrderDetail {
            order,
            items,
            payment: None,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Owner-only view.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(db)
            .await?;
        let payment = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .one(db)
            .await?;

        Ok(OrderDetail {
            order,
            items,
            payment,
        })
    }
}
