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

/// Run the failed-asset sweeper as a background task.
pub async fn run_failed_asset_sweeper(db: DatabaseConnection, config: SweepSettings) {
    let scan_interval = Duration::from_secs(config.scan_interval_secs);
    let older_than = Duration::from_secs(config.asset_older_than_secs);

    info!(
        older_than_secs = config.asset_older_than_secs,
        scan_interval_secs = config.scan_interval_secs,
        "Starting failed asset sweeper"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = sweep_failed_assets(&db, older_than).await {
            error!(error = %e, "Failed asset sweep failed");
        }
    }
}

/// Delete assets stuck in `Pending` longer than `older_than`.
///
/// Each asset gets its own transaction so one failure never aborts the rest
/// of the sweep. Returns the number of assets deleted.
pub async fn sweep_failed_assets(
    db: &DatabaseConnection,
    older_than: Duration,
) -> anyhow::Result<usize> {
    let threshold = Utc::now() - chrono::Duration::from_std(older_than)?;

    let stuck_ids: Vec<Uuid> = asset::Entity::find()
        .select_only()
        .column(asset::Column::Id)
        .filter(asset::Column::State.eq(LifecycleState::Pending))
        .filter(asset::Column::CreatedAt.lt(threshold))
        .into_tuple()
        .all(db)
        .await?;

    if stuck_ids.is_empty() {
        return Ok(0);
    }

    info!(count = stuck_ids.len(), "Found stuck pending assets");

    let mut deleted = 0;
    for asset_id in stuck_ids {
        match sweep_one_asset(db, asset_id).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => {
                error!(%asset_id, error = %e, "Failed to sweep stuck asset");
            }
        }
    }

    Ok(deleted)
}

async fn sweep_one_asset(db: &DatabaseConnection, asset_id: Uuid) -> anyhow::Result<bool> {
    let txn = db.begin().await?;

    let stuck = asset::Entity::find_by_id(asset_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let Some(stuck) = stuck else {
        txn.rollback().await?;
        return Ok(false);
    };

    // Re-check under the lock: a worker may have promoted it meanwhile.
    if stuck.state != LifecycleState::Pending {
        txn.rollback().await?;
        return Ok(false);
    }

    let variants = asset_variant::Entity::find()
        .filter(asset_variant::Column::AssetId.eq(asset_id))
        .all(&txn)
        .await?;

    let outbox = OutboxService::new(&txn);
    for variant in &variants {
        if let Some(key) = &variant.object_store_key {
            outbox
                .enqueue_reap(ObjectLocation::new(
                    variant.object_store_bucket.clone(),
                    key.clone(),
                ))
                .await?;
        }
    }

    asset_variant::Entity::delete_many()
        .filter(asset_variant::Column::AssetId.eq(asset_id))
        .exec(&txn)
        .await?;
    asset::Entity::delete_by_id(asset_id).exec(&txn).await?;

    txn.commit().await?;

    info!(%asset_id, path = %stuck.path, "Deleted stuck pending asset");
    Ok(true)
}
