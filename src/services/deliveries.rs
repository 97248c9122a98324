use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::otp as otp_codes;
use crate::db::DbPool;
use crate::entities::delivery::{self, DeliveryStatus};
use crate::entities::order::{self, OrderStatus};
use crate::entities::{account, delivery_order, driver_profile, order_item};
use crate::errors::ServiceError;
use crate::events::{emit, Event, EventSender};
use crate::services::delivery_status::{next_status, verify_delivery_otp, DeliveryAction};
use crate::services::payments::PaymentService;

const NOT_ASSIGNED: &str = "Authenticated user is not the assigned driver for this delivery.";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AssignDeliveryRequest {
    #[validate(length(min = 1, message = "At least one order is required"))]
    pub order_ids: Vec<Uuid>,
    pub driver_id: Uuid,
    pub delivery_radius_km: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ConfirmDeliveryRequest {
    pub otp: Option<String>,
}

/// A delivery with the orders it carries.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeliveryView {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: DeliveryStatus,
    pub delivery_radius_km: Decimal,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub orders: Vec<order::Model>,
    /// Only present on the responses that issue a code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

impl DeliveryView {
    fn new(delivery: delivery::Model, orders: Vec<order::Model>) -> Self {
        Self {
            id: delivery.id,
            warehouse_id: delivery.warehouse_id,
            driver_id: delivery.driver_id,
            status: delivery.status,
            delivery_radius_km: delivery.delivery_radius_km,
            picked_up_at: delivery.picked_up_at,
            in_transit_at: delivery.in_transit_at,
            delivered_at: delivery.delivered_at,
            cancelled_at: delivery.cancelled_at,
            created_at: delivery.created_at,
            orders,
            otp: None,
        }
    }

    fn with_otp(mut self, code: String) -> Self {
        self.otp = Some(code);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DriverDashboard {
    pub todays_deliveries: u64,
    pub total_deliveries: u64,
    pub processing: u64,
    pub completed: u64,
    pub canceled: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingView {
    pub order_number: String,
    pub order_status: OrderStatus,
    pub delivery_id: Uuid,
    pub delivery_status: DeliveryStatus,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Driver assignment and the delivery lifecycle.
#[derive(Clone)]
pub struct DeliveryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    otp_window: Duration,
    default_radius_km: Decimal,
}

impl DeliveryService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        otp_window: Duration,
        default_radius_km: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            otp_window,
            default_radius_km,
        }
    }

    async fn linked_orders<C: ConnectionTrait>(
        conn: &C,
        delivery_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let order_ids: Vec<Uuid> = delivery_order::Entity::find()
            .filter(delivery_order::Column::DeliveryId.eq(delivery_id))
            .all(conn)
            .await?
            .into_iter()
            .map(|link| link.order_id)
            .collect();

        Ok(order::Entity::find()
            .filter(order::Column::Id.is_in(order_ids))
            .order_by_asc(order::Column::OrderNumber)
            .all(conn)
            .await?)
    }

    async fn assigned_delivery<C: ConnectionTrait>(
        conn: &C,
        driver_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<delivery::Model, ServiceError> {
        let found = delivery::Entity::find_by_id(delivery_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Delivery not found".to_string()))?;
        if found.driver_id != Some(driver_id) {
            warn!(delivery_id = %delivery_id, driver_id = %driver_id, "delivery accessed by another driver");
            return Err(ServiceError::Forbidden(NOT_ASSIGNED.to_string()));
        }
        Ok(found)
    }

    /// Writes `changes` only if the row still has status `expected`.
    async fn guarded_update<C: ConnectionTrait>(
        conn: &C,
        delivery_id: Uuid,
        expected: DeliveryStatus,
        changes: delivery::ActiveModel,
    ) -> Result<(), ServiceError> {
        let res = delivery::Entity::update_many()
            .set(changes)
            .filter(delivery::Column::Id.eq(delivery_id))
            .filter(delivery::Column::Status.eq(expected))
            .exec(conn)
            .await?;
        if res.rows_affected != 1 {
            return Err(ServiceError::InvalidStatus(
                "Delivery was updated by another request".to_string(),
            ));
        }
        Ok(())
    }

    async fn set_order_status<C: ConnectionTrait>(
        conn: &C,
        order_ids: &[Uuid],
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.is_in(order_ids.to_vec()))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn release_driver<C: ConnectionTrait>(
        conn: &C,
        driver_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if let Some(driver_id) = driver_id {
            driver_profile::Entity::update_many()
                .col_expr(driver_profile::Column::IsFree, Expr::value(true))
                .filter(driver_profile::Column::AccountId.eq(driver_id))
                .exec(conn)
                .await?;
        }
        Ok(())
    }

    fn customers_of(orders: &[order::Model]) -> Vec<Uuid> {
        orders
            .iter()
            .map(|o| o.customer_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    async fn view(&self, delivery_id: Uuid) -> Result<DeliveryView, ServiceError> {
        let db = &*self.db_pool;
        let found = delivery::Entity::find_by_id(delivery_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Delivery not found".to_string()))?;
        let orders = Self::linked_orders(db, delivery_id).await?;
        Ok(DeliveryView::new(found, orders))
    }

    /// Hands a batch of pending orders from the caller's warehouse to one
    /// of its free drivers.
    #[instrument(skip(self, request), fields(warehouse_id = %warehouse_id, driver_id = %request.driver_id, orders = request.order_ids.len()))]
    pub async fn assign(
        &self,
        warehouse_id: Uuid,
        request: AssignDeliveryRequest,
    ) -> Result<DeliveryView, ServiceError> {
        request.validate()?;
        let radius = request.delivery_radius_km.unwrap_or(self.default_radius_km);
        if radius <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Delivery radius must be positive".to_string(),
            ));
        }

        let order_ids: Vec<Uuid> = request
            .order_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for delivery assignment");
            ServiceError::DatabaseError(e)
        })?;

        let orders_unavailable =
            || ServiceError::InvalidStatus("One or more orders are not pending or do not exist".to_string());

        let orders = order::Entity::find()
            .filter(order::Column::Id.is_in(order_ids.clone()))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .all(&txn)
            .await?;
        if orders.len() != order_ids.len() {
            return Err(orders_unavailable());
        }

        let from_this_warehouse: BTreeSet<Uuid> = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .filter(order_item::Column::WarehouseId.eq(warehouse_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|item| item.order_id)
            .collect();
        if from_this_warehouse.len() != order_ids.len() {
            return Err(orders_unavailable());
        }

        let driver_unavailable =
            || ServiceError::InvalidStatus("Driver is not available or not approved".to_string());

        let (driver, driver_account) = driver_profile::Entity::find_by_id(request.driver_id)
            .filter(driver_profile::Column::WarehouseId.eq(warehouse_id))
            .find_also_related(account::Entity)
            .one(&txn)
            .await?
            .ok_or_else(driver_unavailable)?;
        let active = driver_account.map_or(false, |a| a.is_active);
        if !driver.approved || !driver.is_free || !active {
            return Err(driver_unavailable());
        }

        let now = Utc::now();
        let created = delivery::ActiveModel {
            id: Set(Uuid::new_v4()),
            warehouse_id: Set(warehouse_id),
            driver_id: Set(Some(driver.account_id)),
            status: Set(DeliveryStatus::Processing),
            otp: Set(None),
            otp_issued_at: Set(None),
            delivery_radius_km: Set(radius),
            picked_up_at: Set(None),
            in_transit_at: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert delivery");
            ServiceError::DatabaseError(e)
        })?;

        for order_id in &order_ids {
            delivery_order::ActiveModel {
                id: Set(Uuid::new_v4()),
                delivery_id: Set(created.id),
                order_id: Set(*order_id),
            }
            .insert(&txn)
            .await?;
        }

        Self::set_order_status(&txn, &order_ids, OrderStatus::Processing).await?;

        let claimed = driver_profile::Entity::update_many()
            .col_expr(driver_profile::Column::IsFree, Expr::value(false))
            .filter(driver_profile::Column::AccountId.eq(driver.account_id))
            .filter(driver_profile::Column::IsFree.eq(true))
            .exec(&txn)
            .await?;
        if claimed.rows_affected != 1 {
            return Err(driver_unavailable());
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, delivery_id = %created.id, "Failed to commit delivery assignment");
            ServiceError::DatabaseError(e)
        })?;

        info!(delivery_id = %created.id, "Delivery assigned");
        counter!("deliveries.assigned", 1);

        let order_numbers = orders.iter().map(|o| o.order_number.clone()).collect();
        emit(
            &self.event_sender,
            Event::DeliveryAssigned {
                delivery_id: created.id,
                driver_id: driver.account_id,
                order_numbers,
            },
        )
        .await;

        self.view(created.id).await
    }

    #[instrument(skip(self))]
    pub async fn pick_up(&self, driver_id: Uuid, delivery_id: Uuid) -> Result<DeliveryView, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let current = Self::assigned_delivery(&txn, driver_id, delivery_id).await?;
        let next = next_status(current.status, DeliveryAction::PickUp)?;

        let now = Utc::now();
        Self::guarded_update(
            &txn,
            delivery_id,
            current.status,
            delivery::ActiveModel {
                status: Set(next),
                picked_up_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await?;

        let order_ids: Vec<Uuid> = Self::linked_orders(&txn, delivery_id)
            .await?
            .iter()
            .map(|o| o.id)
            .collect();
        Self::set_order_status(&txn, &order_ids, OrderStatus::Processing).await?;
        txn.commit().await?;

        info!(delivery_id = %delivery_id, "Delivery picked up");
        self.view(delivery_id).await
    }

    /// Issues the proof-of-delivery code and sends it to the customers.
    #[instrument(skip(self))]
    pub async fn mark_in_transit(
        &self,
        driver_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<DeliveryView, ServiceError> {
        self.issue_otp(driver_id, delivery_id, DeliveryAction::InTransit)
            .await
    }

    #[instrument(skip(self))]
    pub async fn resend_otp(
        &self,
        driver_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<DeliveryView, ServiceError> {
        self.issue_otp(driver_id, delivery_id, DeliveryAction::ResendOtp)
            .await
    }

    async fn issue_otp(
        &self,
        driver_id: Uuid,
        delivery_id: Uuid,
        action: DeliveryAction,
    ) -> Result<DeliveryView, ServiceError> {
        let db = &*self.db_pool;
        let current = Self::assigned_delivery(db, driver_id, delivery_id).await?;
        let next = next_status(current.status, action)?;

        let code = otp_codes::generate_code();
        let now = Utc::now();
        let mut changes = delivery::ActiveModel {
            status: Set(next),
            otp: Set(Some(code.clone())),
            otp_issued_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        if action == DeliveryAction::InTransit {
            changes.in_transit_at = Set(Some(now));
        }
        Self::guarded_update(db, delivery_id, current.status, changes).await?;

        let view = self.view(delivery_id).await?;
        info!(delivery_id = %delivery_id, status = %view.status, "Delivery OTP issued");

        emit(
            &self.event_sender,
            Event::DeliveryOtpIssued {
                delivery_id,
                customer_ids: Self::customers_of(&view.orders),
                code: code.clone(),
            },
        )
        .await;

        Ok(view.with_otp(code))
    }

    /// Completes the delivery once the customer's code checks out.
    #[instrument(skip(self, request))]
    pub async fn confirm_delivered(
        &self,
        driver_id: Uuid,
        delivery_id: Uuid,
        request: ConfirmDeliveryRequest,
    ) -> Result<DeliveryView, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let current = Self::assigned_delivery(&txn, driver_id, delivery_id).await?;
        let next = next_status(current.status, DeliveryAction::Deliver)?;

        let now = Utc::now();
        if let Err(e) = verify_delivery_otp(
            current.otp.as_deref(),
            current.otp_issued_at,
            request.otp.as_deref(),
            self.otp_window,
            now,
        ) {
            warn!(delivery_id = %delivery_id, error = %e, "delivery OTP rejected");
            return Err(e);
        }

        Self::guarded_update(
            &txn,
            delivery_id,
            current.status,
            delivery::ActiveModel {
                status: Set(next),
                otp: Set(None),
                otp_issued_at: Set(None),
                delivered_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await?;

        let orders = Self::linked_orders(&txn, delivery_id).await?;
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        Self::set_order_status(&txn, &order_ids, OrderStatus::Completed).await?;
        let settled = PaymentService::settle_pending_cod(&txn, &order_ids).await?;
        Self::release_driver(&txn, current.driver_id).await?;
        txn.commit().await?;

        info!(delivery_id = %delivery_id, cod_settled = settled, "Delivery completed");
        counter!("deliveries.completed", 1);
        emit(
            &self.event_sender,
            Event::DeliveryCompleted {
                delivery_id,
                customer_ids: Self::customers_of(&orders),
            },
        )
        .await;

        self.view(delivery_id).await
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, driver_id: Uuid, delivery_id: Uuid) -> Result<DeliveryView, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let current = Self::assigned_delivery(&txn, driver_id, delivery_id).await?;
        let next = next_status(current.status, DeliveryAction::Cancel)?;

        let now = Utc::now();
        Self::guarded_update(
            &txn,
            delivery_id,
            current.status,
            delivery::ActiveModel {
                status: Set(next),
                otp: Set(None),
                otp_issued_at: Set(None),
                cancelled_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await?;

        let orders = Self::linked_orders(&txn, delivery_id).await?;
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        Self::set_order_status(&txn, &order_ids, OrderStatus::Canceled).await?;
        PaymentService::cancel_pending(&txn, &order_ids).await?;
        Self::release_driver(&txn, current.driver_id).await?;
        txn.commit().await?;

        info!(delivery_id = %delivery_id, "Delivery cancelled");
        counter!("deliveries.cancelled", 1);
        emit(
            &self.event_sender,
            Event::DeliveryCancelled {
                delivery_id,
                customer_ids: Self::customers_of(&orders),
            },
        )
        .await;

        self.view(delivery_id).await
    }

    async fn driver_deliveries(
        &self,
        driver_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> Result<Vec<DeliveryView>, ServiceError> {
        let mut query = delivery::Entity::find()
            .filter(delivery::Column::DriverId.eq(driver_id))
            .order_by_desc(delivery::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(delivery::Column::Status.eq(status));
        }

        let rows = query
            .find_with_related(order::Entity)
            .all(&*self.db_pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(d, orders)| DeliveryView::new(d, orders))
            .collect())
    }

    pub async fn pending_for_driver(&self, driver_id: Uuid) -> Result<Vec<DeliveryView>, ServiceError> {
        self.driver_deliveries(driver_id, Some(DeliveryStatus::Processing))
            .await
    }

    pub async fn all_for_driver(&self, driver_id: Uuid) -> Result<Vec<DeliveryView>, ServiceError> {
        self.driver_deliveries(driver_id, None).await
    }

    pub async fn detail_for_driver(
        &self,
        driver_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<DeliveryView, ServiceError> {
        let db = &*self.db_pool;
        let found = Self::assigned_delivery(db, driver_id, delivery_id).await?;
        let orders = Self::linked_orders(db, delivery_id).await?;
        Ok(DeliveryView::new(found, orders))
    }

    #[instrument(skip(self))]
    pub async fn driver_dashboard(&self, driver_id: Uuid) -> Result<DriverDashboard, ServiceError> {
        let db = &*self.db_pool;
        let mine = || delivery::Entity::find().filter(delivery::Column::DriverId.eq(driver_id));

        let start_of_day = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| ServiceError::InternalError("invalid start of day".to_string()))?;

        Ok(DriverDashboard {
            todays_deliveries: mine()
                .filter(delivery::Column::CreatedAt.gte(start_of_day))
                .count(db)
                .await?,
            total_deliveries: mine().count(db).await?,
            processing: mine()
                .filter(delivery::Column::Status.eq(DeliveryStatus::Processing))
                .count(db)
                .await?,
            completed: mine()
                .filter(delivery::Column::Status.eq(DeliveryStatus::Delivered))
                .count(db)
                .await?,
            canceled: mine()
                .filter(delivery::Column::Status.eq(DeliveryStatus::Cancelled))
                .count(db)
                .await?,
        })
    }

    /// Customer-facing status for one of the caller's orders.
    #[instrument(skip(self))]
    pub async fn track(
        &self,
        customer_id: Uuid,
        order_number: &str,
    ) -> Result<TrackingView, ServiceError> {
        let db = &*self.db_pool;
        let order = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let no_delivery =
            || ServiceError::NotFound("Delivery information not found for this order".to_string());
        let link = delivery_order::Entity::find()
            .filter(delivery_order::Column::OrderId.eq(order.id))
            .one(db)
            .await?
            .ok_or_else(no_delivery)?;
        let found = delivery::Entity::find_by_id(link.delivery_id)
            .one(db)
            .await?
            .ok_or_else(no_delivery)?;

        let driver = match found.driver_id {
            Some(id) => account::Entity::find_by_id(id).one(db).await?,
            None => None,
        };

        Ok(TrackingView {
            order_number: order.order_number,
            order_status: order.status,
            delivery_id: found.id,
            delivery_status: found.status,
            driver_name: driver.as_ref().map(|d| d.name.clone()),
            driver_phone: driver.map(|d| d.phone),
            assigned_at: found.created_at,
            picked_up_at: found.picked_up_at,
            in_transit_at: found.in_transit_at,
            delivered_at: found.delivered_at,
            cancelled_at: found.cancelled_at,
        })
    }
}
