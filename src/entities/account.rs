use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Role tag carried by every account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "warehouse")]
    Warehouse,
    #[sea_orm(string_value = "customer")]
    Customer,
    #[sea_orm(string_value = "driver")]
    Driver,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Admin => "admin",
            AccountRole::Warehouse => "warehouse",
            AccountRole::Customer => "customer",
            AccountRole::Driver => "driver",
        }
    }

    /// Roles whose login is gated on an approval flag in their profile table.
    pub fn requires_approval(&self) -> bool {
        matches!(self, AccountRole::Warehouse | AccountRole::Driver)
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub role: AccountRole,
    pub name: String,
    pub email: Option<String>,
    #[sea_orm(unique)]
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::warehouse_profile::Entity")]
    WarehouseProfile,
    #[sea_orm(has_one = "super::driver_profile::Entity")]
    DriverProfile,
    #[sea_orm(has_many = "super::otp::Entity")]
    Otps,
    #[sea_orm(has_many = "super::notification::Entity")]
    Notifications,
}

impl Related<super::warehouse_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WarehouseProfile.def()
    }
}

impl Related<super::driver_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DriverProfile.def()
    }
}

impl Related<super::otp::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Otps.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
