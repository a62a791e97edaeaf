use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use keyquorum_core::{chrono, sea_orm, serde};

/// One outbound notification of a task to an approver
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "deliveries")]
#[serde(crate = "keyquorum_core::serde")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(indexed, column_type = "Text")]
    pub client_id: String,
    #[sea_orm(column_type = "Text")]
    pub target: String,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Deserialize, Serialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "delivery_status")]
#[serde(crate = "keyquorum_core::serde")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "Queued")]
    Queued,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Failed")]
    Failed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::approval_task::Entity",
        from = "Column::ClientId",
        to = "super::approval_task::Column::ClientId"
    )]
    ApprovalTask,
}

impl Related<super::approval_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApprovalTask.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
