use std::time::Duration;

use chrono::Utc;
use common::LifecycleState;
use common::config::SweepSettings;
use common::storage::ObjectLocation;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::entity::{asset, asset_variant};
use crate::outbox::OutboxService;

/// Run the failed-variant sweeper as a background task.
pub async fn run_failed_variant_sweeper(db: DatabaseConnection, config: SweepSettings) {
    let scan_interval = Duration::from_secs(config.scan_interval_secs);
    let older_than = Duration::from_secs(config.variant_older_than_secs);

    info!(
        older_than_secs = config.variant_older_than_secs,
        scan_interval_secs = config.scan_interval_secs,
        "Starting failed variant sweeper"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = sweep_failed_variants(&db, older_than).await {
            error!(error = %e, "Failed variant sweep failed");
        }
    }
}

/// Delete variants stuck in `Pending` longer than `older_than` on otherwise
/// ready assets. Pending variants of pending assets belong to the asset
/// sweeper and are skipped here.
pub async fn sweep_failed_variants(
    db: &DatabaseConnection,
    older_than: Duration,
) -> anyhow::Result<usize> {
    let threshold = Utc::now() - chrono::Duration::from_std(older_than)?;

    let stuck_ids: Vec<Uuid> = asset_variant::Entity::find()
        .select_only()
        .column(asset_variant::Column::Id)
        .filter(asset_variant::Column::State.eq(LifecycleState::Pending))
        .filter(asset_variant::Column::CreatedAt.lt(threshold))
        .into_tuple()
        .all(db)
        .await?;

    if stuck_ids.is_empty() {
        return Ok(0);
    }

    info!(count = stuck_ids.len(), "Found stuck pending variants");

    let mut deleted = 0;
    for variant_id in stuck_ids {
        match sweep_one_variant(db, variant_id).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => {
                error!(%variant_id, error = %e, "Failed to sweep stuck variant");
            }
        }
    }

    Ok(deleted)
}

async fn sweep_one_variant(db: &DatabaseConnection, variant_id: Uuid) -> anyhow::Result<bool> {
    let txn = db.begin().await?;

    let stuck = asset_variant::Entity::find_by_id(variant_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let Some(stuck) = stuck else {
        txn.rollback().await?;
        return Ok(false);
    };

    if stuck.state != LifecycleState::Pending {
        txn.rollback().await?;
        return Ok(false);
    }

    let owner = asset::Entity::find_by_id(stuck.asset_id).one(&txn).await?;
    if owner.is_some_and(|owner| owner.state == LifecycleState::Pending) {
        txn.rollback().await?;
        return Ok(false);
    }

    if let Some(key) = &stuck.object_store_key {
        let outbox = OutboxService::new(&txn);
        outbox
            .enqueue_reap(ObjectLocation::new(
                stuck.object_store_bucket.clone(),
                key.clone(),
            ))
            .await?;
    }

    asset_variant::Entity::delete_by_id(variant_id)
        .exec(&txn)
        .await?;

    txn.commit().await?;

    info!(%variant_id, asset_id = %stuck.asset_id, "Deleted stuck pending variant");
    Ok(true)
}
