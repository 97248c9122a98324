use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{favorite, product};
use crate::errors::ServiceError;

#[derive(Clone)]
pub struct FavoriteService {
    db_pool: Arc<DbPool>,
}

impl FavoriteService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .join(JoinType::InnerJoin, favorite::Relation::Product.def().rev())
            .filter(favorite::Column::CustomerId.eq(customer_id))
            .order_by_desc(favorite::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Adding a product that is already a favourite is a no-op.
    #[instrument(skip(self))]
    pub async fn add(&self, customer_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let existing = favorite::Entity::find()
            .filter(favorite::Column::CustomerId.eq(customer_id))
            .filter(favorite::Column::ProductId.eq(product_id))
            .one(db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        favorite::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            product_id: Set(product_id),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;
        info!("favourite added");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, customer_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let res = favorite::Entity::delete_many()
            .filter(favorite::Column::CustomerId.eq(customer_id))
            .filter(favorite::Column::ProductId.eq(product_id))
            .exec(&*self.db_pool)
            .await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::NotFound("Favourite not found".to_string()));
        }
        Ok(())
    }
}
