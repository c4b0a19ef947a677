use std::time::Duration;

use sea_orm::sea_query::{Index, PostgresQueryBuilder};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::info;

use crate::entity::{asset, asset_variant, outbox_event};

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    // Set connection pool options
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("server::entity::*")
        .sync(&db)
        .await?;

    ensure_indexes(&db).await?;

    Ok(db)
}

/// Create the indexes the entity derive cannot express.
///
/// The two unique indexes carry repository invariants: entry_id allocation
/// relies on (path, entry_id) rejecting duplicate allocations, and variant
/// dedup relies on (asset_id, transformation_key) rejecting the loser of a
/// concurrent generation race.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let statements = [
        Index::create()
            .if_not_exists()
            .name("uq_asset_path_entry")
            .table(asset::Entity)
            .col(asset::Column::Path)
            .col(asset::Column::EntryId)
            .unique()
            .to_string(PostgresQueryBuilder),
        Index::create()
            .if_not_exists()
            .name("uq_variant_asset_transformation_key")
            .table(asset_variant::Entity)
            .col(asset_variant::Column::AssetId)
            .col(asset_variant::Column::TransformationKey)
            .unique()
            .to_string(PostgresQueryBuilder),
        // Sweep scans: pending rows older than a threshold.
        Index::create()
            .if_not_exists()
            .name("idx_asset_state_created")
            .table(asset::Entity)
            .col(asset::Column::State)
            .col(asset::Column::CreatedAt)
            .to_string(PostgresQueryBuilder),
        Index::create()
            .if_not_exists()
            .name("idx_variant_state_created")
            .table(asset_variant::Entity)
            .col(asset_variant::Column::State)
            .col(asset_variant::Column::CreatedAt)
            .to_string(PostgresQueryBuilder),
        Index::create()
            .if_not_exists()
            .name("idx_outbox_type_attempts_created")
            .table(outbox_event::Entity)
            .col(outbox_event::Column::EventType)
            .col(outbox_event::Column::Attempts)
            .col(outbox_event::Column::CreatedAt)
            .to_string(PostgresQueryBuilder),
    ];

    for stmt in statements {
        db.execute_unprepared(&stmt).await?;
    }

    // The sea_query builder cannot express operator classes; descendant
    // queries need text_pattern_ops for LIKE 'prefix%' to use the index.
    db.execute_unprepared(
        "CREATE INDEX IF NOT EXISTS idx_asset_path_prefix ON asset (path text_pattern_ops)",
    )
    .await?;

    info!("Ensured asset, variant, and outbox indexes exist");
    Ok(())
}
