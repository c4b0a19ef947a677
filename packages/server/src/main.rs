//! Maintenance daemon: runs the failure sweepers and the variant reaper
//! against the configured database and object store.

use std::sync::Arc;

use common::storage::filesystem::FilesystemObjectStore;
use server::config::AppConfig;
use server::database::init_db;
use server::sweeper::{run_failed_asset_sweeper, run_failed_variant_sweeper, run_variant_reaper};
use tracing::{Level, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load()?;
    let db = init_db(&config.database.url).await?;
    let store = Arc::new(
        FilesystemObjectStore::new(
            config.storage.root_dir.clone().into(),
            config.storage.max_object_size,
        )
        .await?,
    );

    info!(root_dir = %config.storage.root_dir, "Sweep daemon starting");

    tokio::select! {
        _ = run_failed_asset_sweeper(db.clone(), config.sweep.clone()) => {}
        _ = run_failed_variant_sweeper(db.clone(), config.sweep.clone()) => {}
        _ = run_variant_reaper(db, store, config.sweep.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
