use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use keyquorum_core::{chrono, sea_orm, serde};

/// An approval task as received by an approver endpoint
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "approval_requests")]
#[serde(crate = "keyquorum_core::serde")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub client_id: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    #[sea_orm(column_type = "Text")]
    pub callback_address: String,
    pub received_at: DateTime<Utc>,
    pub decision: Option<super::ballot::Decision>,
    pub decided_at: Option<DateTime<Utc>>,
    pub delivery_status: Option<super::delivery::DeliveryStatus>,
    pub delivery_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
