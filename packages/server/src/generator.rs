use std::sync::Arc;

use common::attributes::{LqipKind, LqipPayload, VariantAttributes};
use common::pipeline::{ImagePipeline, LqipGenerator, PreprocessSettings};
use common::storage::ObjectStore;
use common::transformation::{
    Transformation, TransformationNormalizer, TransformationRequest, normalize_all,
};
use common::{AssetError, AssetPath};
use scheduler::{PriorityConsumer, PrioritySender, SchedulerError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::entity::asset_variant;
use crate::jobs::{Job, PreProcessOutcome};
use crate::repository::{AssetRepository, StoreVariantRequest, VariantSelector};

/// Everything a worker needs to process any job kind.
pub struct GeneratorContext {
    pub repository: AssetRepository,
    pub store: Arc<dyn ObjectStore>,
    pub pipeline: Arc<dyn ImagePipeline>,
    pub lqip: Vec<Arc<dyn LqipGenerator>>,
    /// Bucket derived variants are written to.
    pub bucket: String,
}

/// Fixed-size pool of workers draining the priority channel.
pub struct VariantGenerator;

impl VariantGenerator {
    /// Spawn `worker_count` workers sharing one consumer. Each worker runs
    /// until the channel disconnects; a failing job resolves its reply with
    /// the failure and the worker moves on.
    pub fn spawn(
        context: Arc<GeneratorContext>,
        consumer: PriorityConsumer<Job>,
        worker_count: usize,
    ) -> Vec<JoinHandle<()>> {
        (0..worker_count)
            .map(|worker_id| {
                let context = context.clone();
                let consumer = consumer.clone();
                tokio::spawn(async move {
                    debug!(worker_id, "Variant worker started");
                    loop {
                        match consumer.next().await {
                            Ok(job) => process_job(&context, job).await,
                            Err(SchedulerError::Disconnected) => break,
                            Err(e) => {
                                error!(worker_id, error = %e, "Variant worker stopping");
                                break;
                            }
                        }
                    }
                    debug!(worker_id, "Variant worker stopped");
                })
            })
            .collect()
    }
}

async fn process_job(context: &GeneratorContext, job: Job) {
    debug!(kind = job.kind(), "Processing job");
    match job {
        Job::PreProcess {
            source,
            settings,
            lqip,
            bucket,
            reply,
        } => {
            let outcome = pre_process(context, &source, &settings, &lqip, &bucket).await;
            if let Err(e) = &outcome {
                warn!(error = %e, "Pre-process job failed");
            }
            let _ = reply.send(outcome);
        }
        Job::OnDemand {
            path,
            entry_id,
            transformation,
            reply,
        } => {
            let outcome = generate_one(context, &path, entry_id, &transformation).await;
            if let Err(e) = &outcome {
                warn!(%path, error = %e, "On-demand generation failed");
            }
            let _ = reply.send(outcome);
        }
        Job::Eager {
            path,
            entry_id,
            transformations,
            reply,
        } => {
            let outcome = generate_eager(context, &path, entry_id, &transformations).await;
            match &outcome {
                Ok(variants) => {
                    info!(%path, generated = variants.len(), "Eager generation finished")
                }
                Err(e) => warn!(%path, error = %e, "Eager generation failed"),
            }
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
        }
    }
}

/// Normalize first-time ingested bytes and write them to the output bucket.
async fn pre_process(
    context: &GeneratorContext,
    source: &[u8],
    settings: &PreprocessSettings,
    lqip_kinds: &[LqipKind],
    bucket: &str,
) -> Result<PreProcessOutcome, AssetError> {
    let processed = context.pipeline.preprocess(source, settings).await?;
    let lqip = compute_lqip(
        context,
        lqip_kinds,
        &processed.bytes,
        &processed.attributes,
    )?;

    let location = context.store.persist(bucket, &processed.bytes).await?;
    Ok(PreProcessOutcome {
        location,
        attributes: processed.attributes,
        lqip,
    })
}

/// Generate one variant, reusing an existing ready row when the key already
/// exists.
async fn generate_one(
    context: &GeneratorContext,
    path: &AssetPath,
    entry_id: Option<i64>,
    transformation: &Transformation,
) -> Result<asset_variant::Model, AssetError> {
    let key = transformation.key();
    if let Some(fetched) = context
        .repository
        .fetch_by_path(path, entry_id, VariantSelector::Key(key), None)
        .await?
        && let Some(existing) = fetched.variants.into_iter().next()
    {
        debug!(%path, "Variant already exists, skipping generation");
        return Ok(existing);
    }

    let fetched = context
        .repository
        .fetch_by_path(path, entry_id, VariantSelector::Original, None)
        .await?
        .ok_or_else(|| AssetError::not_found(format!("no ready asset at {path}")))?;
    let original = fetched.variants.into_iter().next().ok_or_else(|| {
        AssetError::not_found(format!("asset at {path} has no original variant"))
    })?;

    if transformation.is_original() {
        return Ok(original);
    }

    let original_key = original.object_store_key.as_deref().ok_or_else(|| {
        AssetError::transient(format!(
            "original variant {} has no stored object",
            original.id
        ))
    })?;
    let source = context
        .store
        .fetch(&original.object_store_bucket, original_key)
        .await?;
    let source_attributes = original.attributes()?;

    let processed = context
        .pipeline
        .process(&source, &source_attributes, transformation)
        .await?;

    let lqip = if processed.requires_lqip_regeneration {
        let kinds: Vec<LqipKind> = context.lqip.iter().map(|g| g.kind()).collect();
        compute_lqip(context, &kinds, &processed.bytes, &processed.attributes)?
    } else {
        original
            .lqip
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    };

    // Claim the uniqueness slot before touching the object store so a lost
    // race never leaves orphaned bytes behind.
    let (_, variant) = context
        .repository
        .store_variant_pending(
            path,
            entry_id,
            StoreVariantRequest {
                bucket: context.bucket.clone(),
                transformation: transformation.clone(),
                attributes: processed.attributes,
                lqip,
            },
        )
        .await?;

    let location = context
        .store
        .persist(&context.bucket, &processed.bytes)
        .await?;
    context
        .repository
        .record_variant_object(variant.id, &location)
        .await?;
    let ready = context.repository.mark_variant_ready(variant.id).await?;

    info!(%path, variant_id = %ready.id, "Generated variant");
    Ok(ready)
}

/// Generate a list of variants for one asset. Stops at the first failure;
/// variants completed before the failure stay persisted.
async fn generate_eager(
    context: &GeneratorContext,
    path: &AssetPath,
    entry_id: Option<i64>,
    transformations: &[Transformation],
) -> Result<Vec<asset_variant::Model>, AssetError> {
    if transformations.is_empty() {
        return Err(AssetError::validation(
            "eager generation requires at least one transformation",
        ));
    }

    let mut generated = Vec::with_capacity(transformations.len());
    for transformation in transformations {
        generated.push(generate_one(context, path, entry_id, transformation).await?);
    }
    Ok(generated)
}

fn compute_lqip(
    context: &GeneratorContext,
    kinds: &[LqipKind],
    bytes: &[u8],
    attributes: &VariantAttributes,
) -> Result<Option<LqipPayload>, AssetError> {
    let mut payload = LqipPayload::default();
    for generator in &context.lqip {
        if kinds.contains(&generator.kind()) {
            payload.set(generator.kind(), generator.generate(bytes, attributes)?);
        }
    }
    Ok(if payload.is_empty() {
        None
    } else {
        Some(payload)
    })
}

/// Submission API over the priority channel.
///
/// Interactive paths suspend the caller until the worker resolves the reply;
/// eager paths return as soon as the job is enqueued.
pub struct VariantService {
    sender: PrioritySender<Job>,
    repository: AssetRepository,
    normalizer: TransformationNormalizer<AssetRepository>,
}

impl VariantService {
    pub fn new(sender: PrioritySender<Job>, repository: AssetRepository) -> Self {
        let normalizer = TransformationNormalizer::new(repository.clone());
        Self {
            sender,
            repository,
            normalizer,
        }
    }

    /// Run first-time ingestion at interactive priority and wait for the
    /// result.
    pub async fn pre_process(
        &self,
        source: Vec<u8>,
        settings: PreprocessSettings,
        lqip: Vec<LqipKind>,
        bucket: String,
    ) -> Result<PreProcessOutcome, AssetError> {
        let (job, rx) = Job::pre_process(source, settings, lqip, bucket);
        self.sender
            .send_high(job)
            .map_err(|_| AssetError::transient("variant workers are shut down"))?;
        rx.await
            .map_err(|_| AssetError::transient("variant worker dropped the job"))?
    }

    /// Resolve a client request to a variant, generating it at interactive
    /// priority when no ready variant matches.
    pub async fn get_or_generate(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
        requested: &TransformationRequest,
    ) -> Result<asset_variant::Model, AssetError> {
        let transformation = self.normalizer.normalize(path, entry_id, requested).await?;

        let key = transformation.key();
        if let Some(fetched) = self
            .repository
            .fetch_by_path(path, entry_id, VariantSelector::Key(key), None)
            .await?
            && let Some(existing) = fetched.variants.into_iter().next()
        {
            return Ok(existing);
        }

        let (job, rx) = Job::on_demand(path.clone(), entry_id, transformation);
        self.sender
            .send_high(job)
            .map_err(|_| AssetError::transient("variant workers are shut down"))?;
        rx.await
            .map_err(|_| AssetError::transient("variant worker dropped the job"))?
    }

    /// Eager generation at background priority, but awaited: resolves once
    /// every requested variant is persisted or with the first failure.
    pub async fn generate_eager(
        &self,
        path: AssetPath,
        entry_id: Option<i64>,
        requests: &[TransformationRequest],
        original: &VariantAttributes,
    ) -> Result<Vec<asset_variant::Model>, AssetError> {
        let transformations = normalize_all(requests, original)?;
        let (job, rx) = Job::eager_with_reply(path, entry_id, transformations);
        self.sender
            .send_background(job)
            .map_err(|_| AssetError::transient("variant workers are shut down"))?;
        rx.await
            .map_err(|_| AssetError::transient("variant worker dropped the job"))?
    }

    /// Queue background generation of a set of variants, normalized against
    /// attributes the caller already holds (typically right after
    /// ingestion). Fire and forget.
    pub fn schedule_eager(
        &self,
        path: AssetPath,
        entry_id: Option<i64>,
        requests: &[TransformationRequest],
        original: &VariantAttributes,
    ) -> Result<(), AssetError> {
        let transformations = normalize_all(requests, original)?;
        self.sender
            .send_background(Job::eager(path, entry_id, transformations))
            .map_err(|_| AssetError::transient("variant workers are shut down"))
    }
}
