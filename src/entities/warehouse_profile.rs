use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity document a warehouse registered with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum IdentityType {
    #[sea_orm(string_value = "Aadhar Card")]
    #[serde(rename = "Aadhar Card")]
    AadharCard,
    #[sea_orm(string_value = "Pan Card")]
    #[serde(rename = "Pan Card")]
    PanCard,
    #[sea_orm(string_value = "Driving Licence")]
    #[serde(rename = "Driving Licence")]
    DrivingLicence,
    #[sea_orm(string_value = "Voter ID")]
    #[serde(rename = "Voter ID")]
    VoterId,
}

/// Warehouse-specific fields, keyed by the owning account.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = WarehouseProfile)]
#[sea_orm(table_name = "warehouse_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub account_id: Uuid,
    #[sea_orm(unique)]
    pub warehouse_code: String,
    pub warehouse_name: String,
    pub identity_type: IdentityType,
    pub gst_no: Option<String>,
    pub fssai_no: Option<String>,
    pub operation_area: String,
    pub address: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id",
        on_delete = "Cascade"
    )]
    Account,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
