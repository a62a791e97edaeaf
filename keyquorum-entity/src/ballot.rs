use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use keyquorum_core::{chrono, sea_orm, serde};

/// One expected approver of a task, and its vote once cast
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "ballots")]
#[serde(crate = "keyquorum_core::serde")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub client_id: String,
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub approver: String,
    pub position: i32,
    pub decision: Option<Decision>,
    pub voted_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Deserialize, Serialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "decision")]
#[serde(crate = "keyquorum_core::serde", rename_all = "lowercase")]
pub enum Decision {
    #[sea_orm(string_value = "approve")]
    #[serde(alias = "yes")]
    Approve,
    #[sea_orm(string_value = "reject")]
    #[serde(alias = "no")]
    Reject,
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
