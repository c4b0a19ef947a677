use chrono::Utc;
use common::storage::ObjectLocation;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

use crate::entity::outbox_event;

/// Event type for deferred object-store deletion.
pub const REAP_VARIANT: &str = "REAP_VARIANT";

/// Payload of a [`REAP_VARIANT`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReapVariantPayload {
    pub object_store_bucket: String,
    pub object_store_key: String,
}

impl From<ObjectLocation> for ReapVariantPayload {
    fn from(location: ObjectLocation) -> Self {
        Self {
            object_store_bucket: location.bucket,
            object_store_key: location.key,
        }
    }
}

impl From<ReapVariantPayload> for ObjectLocation {
    fn from(payload: ReapVariantPayload) -> Self {
        ObjectLocation::new(payload.object_store_bucket, payload.object_store_key)
    }
}

/// Append/consume API over the outbox table.
///
/// Generic over the connection so enqueues can ride the same transaction as
/// the row deletion they compensate for.
pub struct OutboxService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> OutboxService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Record that the bytes at `location` must eventually be deleted.
    pub async fn enqueue_reap(
        &self,
        location: ObjectLocation,
    ) -> Result<outbox_event::Model, DbErr> {
        let payload = ReapVariantPayload::from(location);
        let model = outbox_event::ActiveModel {
            event_type: Set(REAP_VARIANT.to_string()),
            payload: Set(serde_json::to_value(&payload).unwrap_or_default()),
            attempts: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        model.insert(self.conn).await
    }

    /// Pending reap events, up to `limit`, least-attempted first so a
    /// batch full of permanently-failing events cannot starve fresh ones.
    /// Ties break by age.
    pub async fn next_reap_batch(&self, limit: u64) -> Result<Vec<outbox_event::Model>, DbErr> {
        outbox_event::Entity::find()
            .filter(outbox_event::Column::EventType.eq(REAP_VARIANT))
            .order_by_asc(outbox_event::Column::Attempts)
            .order_by_asc(outbox_event::Column::CreatedAt)
            .limit(limit)
            .all(self.conn)
            .await
    }

    /// Count a failed delivery attempt against an event.
    pub async fn record_failure(&self, event: &outbox_event::Model) -> Result<(), DbErr> {
        let update = outbox_event::ActiveModel {
            id: Set(event.id),
            attempts: Set(event.attempts.saturating_add(1)),
            ..Default::default()
        };
        update.update(self.conn).await?;
        Ok(())
    }

    /// Remove a consumed event.
    pub async fn delete(&self, id: i64) -> Result<(), DbErr> {
        outbox_event::Entity::delete_by_id(id)
            .exec(self.conn)
            .await?;
        Ok(())
    }
}
