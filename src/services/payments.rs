use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentMethod};
use crate::entities::payment::{self, PaymentStatus};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    pub order_id: Uuid,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    #[validate(length(max = 100))]
    pub gateway_order_id: Option<String>,
    #[validate(length(max = 100))]
    pub gateway_payment_id: Option<String>,
}

/// Records payment outcomes reported by the client. No gateway is called.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
}

impl PaymentService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, method = ?request.payment_method))]
    pub async fn record_payment(
        &self,
        customer_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<payment::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let order = order::Entity::find_by_id(request.order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if order.status == OrderStatus::Canceled {
            return Err(ServiceError::InvalidStatus(
                "Order has been canceled".to_string(),
            ));
        }
        if request.payment_method != order.payment_method {
            return Err(ServiceError::ValidationError(
                "Payment method does not match the order".to_string(),
            ));
        }
        if request.amount != order.total_amount {
            return Err(ServiceError::ValidationError(
                "Payment amount does not match the order total".to_string(),
            ));
        }

        let now = Utc::now();
        let (status, payment_date) = match request.payment_method {
            PaymentMethod::Online => {
                let has_gateway_id = request
                    .gateway_payment_id
                    .as_deref()
                    .map_or(false, |id| !id.trim().is_empty());
                if !has_gateway_id {
                    return Err(ServiceError::ValidationError(
                        "gateway_payment_id is required for online payments".to_string(),
                    ));
                }
                (PaymentStatus::Completed, Some(now))
            }
            PaymentMethod::Cod => (PaymentStatus::Pending, None),
        };

        let recorded = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            customer_id: Set(customer_id),
            payment_method: Set(request.payment_method),
            amount: Set(request.amount),
            status: Set(status),
            gateway_order_id: Set(request.gateway_order_id),
            gateway_payment_id: Set(request.gateway_payment_id),
            payment_date: Set(payment_date),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(|err| match err.sql_err() {
            // payments.order_id is unique, so a second or concurrent record lands here
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::Conflict("Payment already recorded for this order".to_string())
            }
            _ => ServiceError::from(err),
        })?;

        info!(payment_id = %recorded.id, status = %recorded.status, "Payment recorded");
        Ok(recorded)
    }

    /// Settles pending cash-on-delivery payments for the given orders.
    pub async fn settle_pending_cod<C: ConnectionTrait>(
        conn: &C,
        order_ids: &[Uuid],
    ) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let res = payment::Entity::update_many()
            .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Completed))
            .col_expr(payment::Column::PaymentDate, Expr::value(now))
            .col_expr(payment::Column::UpdatedAt, Expr::value(now))
            .filter(payment::Column::OrderId.is_in(order_ids.to_vec()))
            .filter(payment::Column::PaymentMethod.eq(PaymentMethod::Cod))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn cancel_pending<C: ConnectionTrait>(
        conn: &C,
        order_ids: &[Uuid],
    ) -> Result<u64, ServiceError> {
        let res = payment::Entity::update_many()
            .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Canceled))
            .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment::Column::OrderId.is_in(order_ids.to_vec()))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }
}
