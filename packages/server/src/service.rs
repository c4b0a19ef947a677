use std::sync::Arc;

use common::pipeline::{ImagePipeline, LqipGenerator};
use common::storage::ObjectStore;
use scheduler::priority_channel;
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::database::init_db;
use crate::generator::{GeneratorContext, VariantGenerator, VariantService};
use crate::repository::AssetRepository;
use crate::sweeper::{run_failed_asset_sweeper, run_failed_variant_sweeper, run_variant_reaper};

/// The assembled asset service: repository, worker pool, and sweepers.
pub struct Service {
    pub repository: AssetRepository,
    pub variants: VariantService,
    workers: Vec<JoinHandle<()>>,
    sweepers: Vec<JoinHandle<()>>,
}

impl Service {
    /// Connect to the database and assemble the full service.
    pub async fn start(
        config: &AppConfig,
        store: Arc<dyn ObjectStore>,
        pipeline: Arc<dyn ImagePipeline>,
        lqip: Vec<Arc<dyn LqipGenerator>>,
    ) -> anyhow::Result<Self> {
        let db = init_db(&config.database.url).await?;
        Self::assemble(db, config, store, pipeline, lqip)
    }

    /// Wire the service onto an existing connection.
    pub fn assemble(
        db: DatabaseConnection,
        config: &AppConfig,
        store: Arc<dyn ObjectStore>,
        pipeline: Arc<dyn ImagePipeline>,
        lqip: Vec<Arc<dyn LqipGenerator>>,
    ) -> anyhow::Result<Self> {
        let repository = AssetRepository::new(db.clone());

        let (sender, consumer) = priority_channel(config.generator.high_priority_weight)?;
        let context = Arc::new(GeneratorContext {
            repository: repository.clone(),
            store: store.clone(),
            pipeline,
            lqip,
            bucket: config.storage.bucket.clone(),
        });
        let workers =
            VariantGenerator::spawn(context, consumer, config.generator.worker_count);

        let sweepers = vec![
            tokio::spawn(run_failed_asset_sweeper(db.clone(), config.sweep.clone())),
            tokio::spawn(run_failed_variant_sweeper(db.clone(), config.sweep.clone())),
            tokio::spawn(run_variant_reaper(db, store, config.sweep.clone())),
        ];

        let variants = VariantService::new(sender, repository.clone());

        info!(
            workers = config.generator.worker_count,
            weight = config.generator.high_priority_weight,
            "Asset service started"
        );

        Ok(Self {
            repository,
            variants,
            workers,
            sweepers,
        })
    }

    /// Stop the sweepers and workers. In-flight jobs are abandoned; their
    /// pending rows are picked up by the sweepers on the next start.
    pub async fn shutdown(self) {
        for sweeper in &self.sweepers {
            sweeper.abort();
        }
        drop(self.variants);
        futures::future::join_all(self.workers).await;
        info!("Asset service stopped");
    }
}
