use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{category, favorite, product, subcategory};
use crate::errors::ServiceError;
use crate::events::{emit, Event, EventSender};
use crate::services::sequences::{self, SequenceKind};

/// Lowercase ASCII words joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Title is required"))]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubcategoryRequest {
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Title is required"))]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    pub category_id: Uuid,
    pub subcategory_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock_quantity: i32,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub reorder_level: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub discount: Option<Decimal>,
    #[validate(range(min = 0))]
    pub reorder_level: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RestockRequest {
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i32,
}

/// Filters for product listings.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    pub category_id: Option<Uuid>,
    pub subcategory_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Trimmed title; whitespace-only input is rejected.
fn clean_title(raw: &str) -> Result<String, ServiceError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ServiceError::ValidationError("Title is required".to_string()));
    }
    Ok(title.to_string())
}

fn check_pricing(price: Decimal, discount: Decimal) -> Result<(), ServiceError> {
    if price <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Price must be greater than zero".to_string(),
        ));
    }
    if discount < Decimal::ZERO || discount > price {
        return Err(ServiceError::ValidationError(
            "Discount must be between zero and the price".to_string(),
        ));
    }
    Ok(())
}

/// Category, subcategory and product records scoped per warehouse.
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn owned_category<C: ConnectionTrait>(
        conn: &C,
        warehouse_id: Uuid,
        category_id: Uuid,
    ) -> Result<category::Model, ServiceError> {
        category::Entity::find_by_id(category_id)
            .filter(category::Column::WarehouseId.eq(warehouse_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Category not found".to_string()))
    }

    async fn owned_subcategory<C: ConnectionTrait>(
        conn: &C,
        warehouse_id: Uuid,
        subcategory_id: Uuid,
    ) -> Result<subcategory::Model, ServiceError> {
        subcategory::Entity::find_by_id(subcategory_id)
            .filter(subcategory::Column::WarehouseId.eq(warehouse_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Subcategory not found".to_string()))
    }

    async fn owned_product<C: ConnectionTrait>(
        conn: &C,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .filter(product::Column::WarehouseId.eq(warehouse_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Category and subcategory must both be the caller's and must nest.
    async fn check_placement<C: ConnectionTrait>(
        conn: &C,
        warehouse_id: Uuid,
        category_id: Uuid,
        subcategory_id: Uuid,
    ) -> Result<(), ServiceError> {
        Self::owned_category(conn, warehouse_id, category_id).await?;
        let sub = Self::owned_subcategory(conn, warehouse_id, subcategory_id).await?;
        if sub.category_id != category_id {
            return Err(ServiceError::ValidationError(
                "Subcategory does not belong to the selected category".to_string(),
            ));
        }
        Ok(())
    }

    // ---- categories ----

    #[instrument(skip(self, request), fields(warehouse_id = %warehouse_id))]
    pub async fn create_category(
        &self,
        warehouse_id: Uuid,
        request: CategoryRequest,
    ) -> Result<category::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let title = clean_title(&request.title)?;

        let clash = category::Entity::find()
            .filter(category::Column::WarehouseId.eq(warehouse_id))
            .filter(category::Column::Title.eq(title.as_str()))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Category '{}' already exists",
                title
            )));
        }

        let now = Utc::now();
        let created = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            warehouse_id: Set(warehouse_id),
            slug: Set(slugify(&title)),
            title: Set(title),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(category_id = %created.id, "category created");
        Ok(created)
    }

    pub async fn list_categories(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .filter(category::Column::WarehouseId.eq(warehouse_id))
            .order_by_asc(category::Column::Title)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self, request), fields(warehouse_id = %warehouse_id, category_id = %category_id))]
    pub async fn update_category(
        &self,
        warehouse_id: Uuid,
        category_id: Uuid,
        request: CategoryRequest,
    ) -> Result<category::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = Self::owned_category(db, warehouse_id, category_id).await?;
        let title = clean_title(&request.title)?;

        let clash = category::Entity::find()
            .filter(category::Column::WarehouseId.eq(warehouse_id))
            .filter(category::Column::Title.eq(title.as_str()))
            .filter(category::Column::Id.ne(category_id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Category '{}' already exists",
                title
            )));
        }

        let mut active: category::ActiveModel = existing.into();
        active.slug = Set(slugify(&title));
        active.title = Set(title);
        active.updated_at = Set(Utc::now());
        Ok(active.update(db).await?)
    }

    /// Removes the category and its subcategories when no product uses them.
    #[instrument(skip(self), fields(warehouse_id = %warehouse_id, category_id = %category_id))]
    pub async fn delete_category(
        &self,
        warehouse_id: Uuid,
        category_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        Self::owned_category(db, warehouse_id, category_id).await?;

        let in_use = product::Entity::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .count(db)
            .await?;
        if in_use > 0 {
            return Err(ServiceError::Conflict(
                "Category still has products".to_string(),
            ));
        }

        let txn = db.begin().await?;
        subcategory::Entity::delete_many()
            .filter(subcategory::Column::CategoryId.eq(category_id))
            .exec(&txn)
            .await?;
        category::Entity::delete_by_id(category_id).exec(&txn).await?;
        txn.commit().await?;

        info!("category deleted");
        Ok(())
    }

    // ---- subcategories ----

    #[instrument(skip(self, request), fields(warehouse_id = %warehouse_id, category_id = %request.category_id))]
    pub async fn create_subcategory(
        &self,
        warehouse_id: Uuid,
        request: SubcategoryRequest,
    ) -> Result<subcategory::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        Self::owned_category(db, warehouse_id, request.category_id).await?;
        let title = clean_title(&request.title)?;

        let clash = subcategory::Entity::find()
            .filter(subcategory::Column::CategoryId.eq(request.category_id))
            .filter(subcategory::Column::Title.eq(title.as_str()))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Subcategory '{}' already exists",
                title
            )));
        }

        let now = Utc::now();
        let created = subcategory::ActiveModel {
            id: Set(Uuid::new_v4()),
            warehouse_id: Set(warehouse_id),
            category_id: Set(request.category_id),
            slug: Set(slugify(&title)),
            title: Set(title),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(subcategory_id = %created.id, "subcategory created");
        Ok(created)
    }

    pub async fn list_subcategories(
        &self,
        warehouse_id: Uuid,
        category_id: Option<Uuid>,
    ) -> Result<Vec<subcategory::Model>, ServiceError> {
        let mut query =
            subcategory::Entity::find().filter(subcategory::Column::WarehouseId.eq(warehouse_id));
        if let Some(category_id) = category_id {
            query = query.filter(subcategory::Column::CategoryId.eq(category_id));
        }
        Ok(query
            .order_by_asc(subcategory::Column::Title)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self, request), fields(warehouse_id = %warehouse_id, subcategory_id = %subcategory_id))]
    pub async fn update_subcategory(
        &self,
        warehouse_id: Uuid,
        subcategory_id: Uuid,
        request: SubcategoryRequest,
    ) -> Result<subcategory::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = Self::owned_subcategory(db, warehouse_id, subcategory_id).await?;
        Self::owned_category(db, warehouse_id, request.category_id).await?;
        let title = clean_title(&request.title)?;

        let clash = subcategory::Entity::find()
            .filter(subcategory::Column::CategoryId.eq(request.category_id))
            .filter(subcategory::Column::Title.eq(title.as_str()))
            .filter(subcategory::Column::Id.ne(subcategory_id))
            .one(db)
            .await?;
        if clash.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Subcategory '{}' already exists",
                title
            )));
        }

        let mut active: subcategory::ActiveModel = existing.into();
        active.category_id = Set(request.category_id);
        active.slug = Set(slugify(&title));
        active.title = Set(title);
        active.updated_at = Set(Utc::now());
        Ok(active.update(db).await?)
    }

    #[instrument(skip(self), fields(warehouse_id = %warehouse_id, subcategory_id = %subcategory_id))]
    pub async fn delete_subcategory(
        &self,
        warehouse_id: Uuid,
        subcategory_id: Uuid,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        Self::owned_subcategory(db, warehouse_id, subcategory_id).await?;

        let in_use = product::Entity::find()
            .filter(product::Column::SubcategoryId.eq(subcategory_id))
            .count(db)
            .await?;
        if in_use > 0 {
            return Err(ServiceError::Conflict(
                "Subcategory still has products".to_string(),
            ));
        }

        subcategory::Entity::delete_by_id(subcategory_id)
            .exec(db)
            .await?;
        info!("subcategory deleted");
        Ok(())
    }

    // ---- products ----

    #[instrument(skip(self, request), fields(warehouse_id = %warehouse_id, title = %request.title))]
    pub async fn create_product(
        &self,
        warehouse_id: Uuid,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        check_pricing(request.price, request.discount)?;

        let txn = self.db_pool.begin().await?;
        Self::check_placement(
            &txn,
            warehouse_id,
            request.category_id,
            request.subcategory_id,
        )
        .await?;

        let sku_no = sequences::next_code(&txn, SequenceKind::Sku).await?;
        let title = clean_title(&request.title)?;
        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            warehouse_id: Set(warehouse_id),
            category_id: Set(request.category_id),
            subcategory_id: Set(request.subcategory_id),
            sku_no: Set(sku_no),
            slug: Set(slugify(&title)),
            title: Set(title),
            description: Set(request.description),
            price: Set(request.price),
            discount: Set(request.discount),
            stock_quantity: Set(request.stock_quantity),
            reorder_level: Set(request.reorder_level),
            is_available: Set(request.stock_quantity > 0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(product_id = %created.id, sku = %created.sku_no, "product created");
        Ok(created)
    }

    #[instrument(skip(self, request), fields(warehouse_id = %warehouse_id, product_id = %product_id))]
    pub async fn update_product(
        &self,
        warehouse_id: Uuid,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = Self::owned_product(db, warehouse_id, product_id).await?;

        let category_id = request.category_id.unwrap_or(existing.category_id);
        let subcategory_id = request.subcategory_id.unwrap_or(existing.subcategory_id);
        if request.category_id.is_some() || request.subcategory_id.is_some() {
            Self::check_placement(db, warehouse_id, category_id, subcategory_id).await?;
        }
        check_pricing(
            request.price.unwrap_or(existing.price),
            request.discount.unwrap_or(existing.discount),
        )?;

        let mut active: product::ActiveModel = existing.into();
        active.category_id = Set(category_id);
        active.subcategory_id = Set(subcategory_id);
        if let Some(title) = request.title {
            let title = clean_title(&title)?;
            active.slug = Set(slugify(&title));
            active.title = Set(title);
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(discount) = request.discount {
            active.discount = Set(discount);
        }
        if let Some(level) = request.reorder_level {
            active.reorder_level = Set(level);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(db).await?;
        info!("product updated");
        Ok(updated)
    }

    #[instrument(skip(self), fields(warehouse_id = %warehouse_id, product_id = %product_id))]
    pub async fn disable_product(
        &self,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = Self::owned_product(db, warehouse_id, product_id).await?;
        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(false);
        let updated = active.update(db).await?;
        info!("product disabled");
        Ok(updated)
    }

    /// Adds stock atomically. Customers who favourited the product hear
    /// about it when it comes back from zero.
    #[instrument(skip(self), fields(warehouse_id = %warehouse_id, product_id = %product_id, quantity = request.quantity))]
    pub async fn restock(
        &self,
        warehouse_id: Uuid,
        product_id: Uuid,
        request: RestockRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let txn = self.db_pool.begin().await?;
        let before = Self::owned_product(&txn, warehouse_id, product_id).await?;

        product::Entity::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).add(request.quantity),
            )
            .col_expr(product::Column::IsAvailable, Expr::value(true))
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(&txn)
            .await?;

        let after = Self::owned_product(&txn, warehouse_id, product_id).await?;
        txn.commit().await?;

        info!(stock = after.stock_quantity, "product restocked");

        if !before.is_available && after.is_available {
            let customer_ids: Vec<Uuid> = favorite::Entity::find()
                .filter(favorite::Column::ProductId.eq(product_id))
                .all(&*self.db_pool)
                .await?
                .into_iter()
                .map(|f| f.customer_id)
                .collect();
            if !customer_ids.is_empty() {
                emit(
                    &self.event_sender,
                    Event::ProductBackInStock {
                        product_id,
                        title: after.title.clone(),
                        customer_ids,
                    },
                )
                .await;
            }
        }

        if after.is_low_on_stock() {
            warn!(stock = after.stock_quantity, reorder_level = after.reorder_level, "product below reorder level");
        }
        Ok(after)
    }

    pub async fn list_products(
        &self,
        warehouse_id: Uuid,
        filter: ProductFilter,
        active_only: bool,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        let mut query = product::Entity::find()
            .filter(product::Column::WarehouseId.eq(warehouse_id))
            .order_by_asc(product::Column::Title);
        if active_only {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(subcategory_id) = filter.subcategory_id {
            query = query.filter(product::Column::SubcategoryId.eq(subcategory_id));
        }

        let limit = filter.limit.unwrap_or(20).clamp(1, 100);
        let page = filter.page.unwrap_or(1).max(1);
        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;
        Ok((items, total))
    }

    /// Warehouse view by SKU, disabled products included.
    pub async fn get_product_by_sku(
        &self,
        warehouse_id: Uuid,
        sku: &str,
    ) -> Result<product::Model, ServiceError> {
        product::Entity::find()
            .filter(product::Column::WarehouseId.eq(warehouse_id))
            .filter(product::Column::SkuNo.eq(sku))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    pub async fn get_public_product(&self, sku: &str) -> Result<product::Model, ServiceError> {
        product::Entity::find()
            .filter(product::Column::SkuNo.eq(sku))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case("Fresh Fruits", "fresh-fruits")]
    #[case("  Dairy & Eggs ", "dairy-eggs")]
    #[case("100% Juice!!", "100-juice")]
    #[case("", "")]
    fn slug_from_title(#[case] title: &str, #[case] expected: &str) {
        assert_eq!(slugify(title), expected);
    }

    #[test]
    fn discount_cannot_exceed_price() {
        assert!(check_pricing(dec!(50), dec!(5)).is_ok());
        assert_matches!(check_pricing(dec!(50), dec!(60)), Err(ServiceError::ValidationError(_)));
        assert_matches!(check_pricing(dec!(0), dec!(0)), Err(ServiceError::ValidationError(_)));
    }

    async fn seeded() -> (CatalogService, Uuid, category::Model, subcategory::Model) {
        let pool = Arc::new(crate::db::migrated_memory_pool().await);
        let svc = CatalogService::new(pool, None);
        let warehouse_id = Uuid::new_v4();
        let cat = svc
            .create_category(warehouse_id, CategoryRequest { title: "Fruits".into() })
            .await
            .unwrap();
        let sub = svc
            .create_subcategory(
                warehouse_id,
                SubcategoryRequest {
                    category_id: cat.id,
                    title: "Citrus".into(),
                },
            )
            .await
            .unwrap();
        (svc, warehouse_id, cat, sub)
    }

    fn product_request(cat: Uuid, sub: Uuid, stock: i32) -> CreateProductRequest {
        CreateProductRequest {
            category_id: cat,
            subcategory_id: sub,
            title: "Orange".into(),
            description: None,
            price: dec!(40),
            discount: dec!(0),
            stock_quantity: stock,
            reorder_level: 2,
        }
    }

    #[tokio::test]
    async fn duplicate_category_title_conflicts_per_warehouse() {
        let (svc, warehouse_id, _, _) = seeded().await;
        assert_matches!(
            svc.create_category(warehouse_id, CategoryRequest { title: "Fruits".into() })
                .await,
            Err(ServiceError::Conflict(_))
        );
        // another warehouse may reuse the title
        assert!(svc
            .create_category(Uuid::new_v4(), CategoryRequest { title: "Fruits".into() })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn product_gets_sequential_sku_and_derived_availability() {
        let (svc, warehouse_id, cat, sub) = seeded().await;
        let p1 = svc
            .create_product(warehouse_id, product_request(cat.id, sub.id, 0))
            .await
            .unwrap();
        let p2 = svc
            .create_product(warehouse_id, product_request(cat.id, sub.id, 3))
            .await
            .unwrap();
        assert_eq!(p1.sku_no, "SKU000000001");
        assert_eq!(p2.sku_no, "SKU000000002");
        assert!(!p1.is_available);
        assert!(p2.is_available);
    }

    #[tokio::test]
    async fn product_rejects_foreign_subcategory() {
        let (svc, warehouse_id, cat, _) = seeded().await;
        let other = svc
            .create_category(warehouse_id, CategoryRequest { title: "Dairy".into() })
            .await
            .unwrap();
        let other_sub = svc
            .create_subcategory(
                warehouse_id,
                SubcategoryRequest {
                    category_id: other.id,
                    title: "Milk".into(),
                },
            )
            .await
            .unwrap();
        assert_matches!(
            svc.create_product(warehouse_id, product_request(cat.id, other_sub.id, 1))
                .await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn restock_flips_availability_and_adds_stock() {
        let (svc, warehouse_id, cat, sub) = seeded().await;
        let p = svc
            .create_product(warehouse_id, product_request(cat.id, sub.id, 0))
            .await
            .unwrap();
        let restocked = svc
            .restock(warehouse_id, p.id, RestockRequest { quantity: 5 })
            .await
            .unwrap();
        assert_eq!(restocked.stock_quantity, 5);
        assert!(restocked.is_available);

        let again = svc
            .restock(warehouse_id, p.id, RestockRequest { quantity: 2 })
            .await
            .unwrap();
        assert_eq!(again.stock_quantity, 7);
    }

    #[tokio::test]
    async fn disabled_products_are_hidden_from_public_reads() {
        let (svc, warehouse_id, cat, sub) = seeded().await;
        let p = svc
            .create_product(warehouse_id, product_request(cat.id, sub.id, 4))
            .await
            .unwrap();
        svc.disable_product(warehouse_id, p.id).await.unwrap();

        let (public, total) = svc
            .list_products(warehouse_id, ProductFilter::default(), true)
            .await
            .unwrap();
        assert!(public.is_empty());
        assert_eq!(total, 0);
        assert_matches!(
            svc.get_public_product(&p.sku_no).await,
            Err(ServiceError::NotFound(_))
        );
        assert!(svc.get_product_by_sku(warehouse_id, &p.sku_no).await.is_ok());
    }

    #[rstest]
    #[case("   ")]
    #[case("\t\n")]
    #[tokio::test]
    async fn blank_titles_are_rejected_after_trimming(#[case] title: &str) {
        let (svc, warehouse_id, cat, sub) = seeded().await;
        assert_matches!(
            svc.create_category(warehouse_id, CategoryRequest { title: title.into() })
                .await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            svc.create_subcategory(
                warehouse_id,
                SubcategoryRequest {
                    category_id: cat.id,
                    title: title.into(),
                },
            )
            .await,
            Err(ServiceError::ValidationError(_))
        );
        let p = svc
            .create_product(warehouse_id, product_request(cat.id, sub.id, 1))
            .await
            .unwrap();
        let rename = UpdateProductRequest {
            title: Some(title.into()),
            ..Default::default()
        };
        assert_matches!(
            svc.update_product(warehouse_id, p.id, rename).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(svc.list_categories(warehouse_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn product_edits_move_updated_at() {
        let (svc, warehouse_id, cat, sub) = seeded().await;
        let p = svc
            .create_product(warehouse_id, product_request(cat.id, sub.id, 2))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let edited = svc
            .update_product(
                warehouse_id,
                p.id,
                UpdateProductRequest {
                    price: Some(dec!(45)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(edited.updated_at > p.updated_at);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let disabled = svc.disable_product(warehouse_id, p.id).await.unwrap();
        assert!(!disabled.is_active);
        assert!(disabled.updated_at > edited.updated_at);
    }

    #[tokio::test]
    async fn category_with_products_cannot_be_deleted() {
        let (svc, warehouse_id, cat, sub) = seeded().await;
        svc.create_product(warehouse_id, product_request(cat.id, sub.id, 1))
            .await
            .unwrap();
        assert_matches!(
            svc.delete_category(warehouse_id, cat.id).await,
            Err(ServiceError::Conflict(_))
        );
    }
}
