use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus};
use crate::entities::{account, driver_profile, order_item};
use crate::errors::ServiceError;

/// An order as seen by one warehouse: only that warehouse's lines.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WarehouseOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailableDriver {
    pub account_id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle_no: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WarehouseDashboard {
    pub revenue: Decimal,
    pub total_orders: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub canceled: u64,
}

#[derive(Clone)]
pub struct WarehouseService {
    db_pool: Arc<DbPool>,
}

impl WarehouseService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Every line this warehouse ships, paired with its order.
    async fn lines(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Vec<(order_item::Model, order::Model)>, ServiceError> {
        let rows = order_item::Entity::find()
            .filter(order_item::Column::WarehouseId.eq(warehouse_id))
            .find_also_related(order::Entity)
            .all(&*self.db_pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(item, order)| order.map(|o| (item, o)))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn pending_orders(&self, warehouse_id: Uuid) -> Result<Vec<WarehouseOrder>, ServiceError> {
        let mut grouped: BTreeMap<(chrono::DateTime<chrono::Utc>, Uuid), WarehouseOrder> =
            BTreeMap::new();
        for (item, order) in self.lines(warehouse_id).await? {
            if order.status != OrderStatus::Pending {
                continue;
            }
            grouped
                .entry((order.created_at, order.id))
                .or_insert_with(|| WarehouseOrder {
                    order,
                    items: Vec::new(),
                })
                .items
                .push(item);
        }
        Ok(grouped.into_values().collect())
    }

    /// Approved, verified and currently free drivers of this warehouse.
    #[instrument(skip(self))]
    pub async fn available_drivers(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Vec<AvailableDriver>, ServiceError> {
        let rows = driver_profile::Entity::find()
            .filter(driver_profile::Column::WarehouseId.eq(warehouse_id))
            .filter(driver_profile::Column::Approved.eq(true))
            .filter(driver_profile::Column::IsFree.eq(true))
            .find_also_related(account::Entity)
            .filter(account::Column::IsActive.eq(true))
            .order_by_asc(account::Column::Name)
            .all(&*self.db_pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(driver, account)| {
                account.map(|a| AvailableDriver {
                    account_id: driver.account_id,
                    name: a.name,
                    phone: a.phone,
                    vehicle_no: driver.vehicle_no,
                })
            })
            .collect())
    }

    /// Revenue counts only this warehouse's lines of completed orders.
    #[instrument(skip(self))]
    pub async fn dashboard(&self, warehouse_id: Uuid) -> Result<WarehouseDashboard, ServiceError> {
        let mut dashboard = WarehouseDashboard::default();
        let mut statuses: HashMap<Uuid, OrderStatus> = HashMap::new();

        for (item, order) in self.lines(warehouse_id).await? {
            if order.status == OrderStatus::Completed {
                dashboard.revenue += item.line_total();
            }
            statuses.insert(order.id, order.status);
        }

        dashboard.total_orders = statuses.len() as u64;
        for status in statuses.values() {
            match status {
                OrderStatus::Pending => dashboard.pending += 1,
                OrderStatus::Processing => dashboard.processing += 1,
                OrderStatus::Completed => dashboard.completed += 1,
                OrderStatus::Canceled => dashboard.canceled += 1,
            }
        }
        Ok(dashboard)
    }
}
