use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable record of cross-system cleanup work.
///
/// Append-only; the reaper deletes a row only once the physical side effect
/// is confirmed, giving at-least-once delivery.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "outbox_event")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(indexed)]
    pub event_type: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub payload: serde_json::Value,

    /// Failed delivery attempts so far; fresh events sort ahead of
    /// repeatedly-failing ones.
    pub attempts: i32,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
