//! Human-readable sequential identifiers backed by the `sequences` table.
//!
//! The counter row is bumped with `value = value + 1` on the caller's
//! connection, so when called inside a transaction the number is only
//! consumed if that transaction commits.

use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;

use crate::entities::sequence;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Order,
    Warehouse,
    Sku,
}

impl SequenceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SequenceKind::Order => "order",
            SequenceKind::Warehouse => "warehouse",
            SequenceKind::Sku => "sku",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            SequenceKind::Order => "ORD",
            SequenceKind::Warehouse => "WH",
            SequenceKind::Sku => "SKU",
        }
    }

    fn width(&self) -> usize {
        match self {
            SequenceKind::Order => 6,
            SequenceKind::Warehouse => 4,
            SequenceKind::Sku => 9,
        }
    }

    /// `ORD000001`, `WH0001`, `SKU000000001`
    pub fn format(&self, value: i64) -> String {
        format!("{}{:0width$}", self.prefix(), value, width = self.width())
    }
}

pub async fn next_value<C>(conn: &C, kind: SequenceKind) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let updated = sequence::Entity::update_many()
        .col_expr(
            sequence::Column::Value,
            Expr::col(sequence::Column::Value).add(1),
        )
        .filter(sequence::Column::Name.eq(kind.name()))
        .exec(conn)
        .await?;

    if updated.rows_affected == 0 {
        sequence::ActiveModel {
            name: Set(kind.name().to_string()),
            value: Set(1),
        }
        .insert(conn)
        .await?;
        return Ok(1);
    }

    let row = sequence::Entity::find_by_id(kind.name().to_string())
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("sequence {} vanished", kind.name()))
        })?;

    debug!(sequence = kind.name(), value = row.value, "allocated sequence value");
    Ok(row.value)
}

pub async fn next_code<C>(conn: &C, kind: SequenceKind) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    next_value(conn, kind).await.map(|v| kind.format(v))
}
