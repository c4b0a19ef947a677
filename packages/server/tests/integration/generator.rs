use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::attributes::LqipKind;
use common::pipeline::PreprocessSettings;
use common::storage::ObjectStore;
use common::transformation::{FitMode, ImageFormat, TransformationRequest};
use common::{AssetError, AssetPath};
use scheduler::priority_channel;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use server::entity::asset_variant;
use server::generator::{GeneratorContext, VariantGenerator, VariantService};
use server::repository::AssetRepository;
use tokio::task::JoinHandle;

use crate::common::{
    FakeLqip, FakePipeline, MemoryObjectStore, TestDb, source_attributes, store_ready_asset,
};

struct Rig {
    harness: TestDb,
    repo: AssetRepository,
    store: Arc<MemoryObjectStore>,
    pipeline: Arc<FakePipeline>,
    service: VariantService,
    _workers: Vec<JoinHandle<()>>,
}

async fn rig(worker_count: usize) -> Rig {
    let harness = TestDb::spawn().await;
    let repo = harness.repository();
    let store = Arc::new(MemoryObjectStore::new());
    let pipeline = Arc::new(FakePipeline::new());

    let (sender, consumer) = priority_channel(90).expect("valid weight");
    let context = Arc::new(GeneratorContext {
        repository: repo.clone(),
        store: store.clone() as Arc<dyn ObjectStore>,
        pipeline: pipeline.clone(),
        lqip: vec![Arc::new(FakeLqip)],
        bucket: "assets".to_string(),
    });
    let workers = VariantGenerator::spawn(context, consumer, worker_count);
    let service = VariantService::new(sender, repo.clone());

    Rig {
        harness,
        repo,
        store,
        pipeline,
        service,
        _workers: workers,
    }
}

fn webp_resize(width: u32, height: u32) -> TransformationRequest {
    TransformationRequest {
        width: Some(width),
        height: Some(height),
        format: Some(ImageFormat::Webp),
        fit: Some(FitMode::Fit),
        ..TransformationRequest::default()
    }
}

#[tokio::test]
async fn on_demand_generation_persists_a_ready_variant() {
    let rig = rig(2).await;
    store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/gen").await;
    let path = AssetPath::parse("/photos/gen").unwrap();

    let variant = rig
        .service
        .get_or_generate(&path, None, &webp_resize(320, 240))
        .await
        .expect("generation should succeed");

    assert_eq!(variant.width, 320);
    assert_eq!(variant.height, 240);
    assert_eq!(variant.format, "webp");
    assert!(!variant.is_original_variant);
    assert!(variant.object_store_key.is_some());
    assert!(
        rig.store
            .exists(
                &variant.object_store_bucket,
                variant.object_store_key.as_deref().unwrap()
            )
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn repeated_requests_reuse_the_cached_variant() {
    let rig = rig(2).await;
    store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/cache").await;
    let path = AssetPath::parse("/photos/cache").unwrap();

    let first = rig
        .service
        .get_or_generate(&path, None, &webp_resize(320, 240))
        .await
        .unwrap();
    let second = rig
        .service
        .get_or_generate(&path, None, &webp_resize(320, 240))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(rig.pipeline.process_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_identical_requests_leave_one_row() {
    let rig = rig(4).await;
    store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/race").await;
    let path = AssetPath::parse("/photos/race").unwrap();

    let request = webp_resize(640, 480);
    let results = futures::future::join_all((0..4).map(|_| {
        let service = &rig.service;
        let path = path.clone();
        let request = request.clone();
        async move { service.get_or_generate(&path, None, &request).await }
    }))
    .await;

    // Losers of the insert race may observe a conflict; nobody may observe a
    // second row.
    assert!(results.iter().any(|r| r.is_ok()));
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, AssetError::Conflict(_)), "unexpected: {e}");
        }
    }

    let rows = asset_variant::Entity::find()
        .filter(asset_variant::Column::IsOriginalVariant.eq(false))
        .count(&rig.harness.db)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn requesting_the_original_returns_the_stored_row() {
    let rig = rig(1).await;
    let (_, original) = store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/orig").await;
    let path = AssetPath::parse("/photos/orig").unwrap();

    let variant = rig
        .service
        .get_or_generate(&path, None, &TransformationRequest::original())
        .await
        .unwrap();

    assert_eq!(variant.id, original.id);
    assert_eq!(rig.pipeline.process_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_asset_fails_without_hanging() {
    let rig = rig(1).await;
    let path = AssetPath::parse("/photos/nothing-here").unwrap();

    let result = rig
        .service
        .get_or_generate(&path, None, &webp_resize(100, 100))
        .await;
    assert!(matches!(result, Err(AssetError::NotFound(_))));
}

#[tokio::test]
async fn a_failing_job_does_not_kill_the_worker() {
    let rig = rig(1).await;
    store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/flaky").await;
    let path = AssetPath::parse("/photos/flaky").unwrap();

    rig.pipeline.set_fail(true);
    let failed = rig
        .service
        .get_or_generate(&path, None, &webp_resize(100, 100))
        .await;
    assert!(matches!(failed, Err(AssetError::Transient(_))));

    rig.pipeline.set_fail(false);
    let recovered = rig
        .service
        .get_or_generate(&path, None, &webp_resize(100, 100))
        .await;
    assert!(recovered.is_ok());
}

#[tokio::test]
async fn eager_generation_persists_all_requested_variants() {
    let rig = rig(2).await;
    let (asset, original) = store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/eager").await;
    let path = AssetPath::parse("/photos/eager").unwrap();

    rig.service
        .schedule_eager(
            path.clone(),
            Some(asset.entry_id),
            &[webp_resize(100, 75), webp_resize(200, 150)],
            &original.attributes().unwrap(),
        )
        .expect("enqueue should succeed");

    // Fire-and-forget: poll until the background workers catch up.
    let mut derived = 0;
    for _ in 0..100 {
        derived = asset_variant::Entity::find()
            .filter(asset_variant::Column::AssetId.eq(asset.id))
            .filter(asset_variant::Column::IsOriginalVariant.eq(false))
            .count(&rig.harness.db)
            .await
            .unwrap();
        if derived == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(derived, 2);
}

#[tokio::test]
async fn eager_with_no_transformations_is_a_validation_error() {
    let rig = rig(1).await;
    store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/eager-empty").await;
    let path = AssetPath::parse("/photos/eager-empty").unwrap();

    let result = rig
        .service
        .generate_eager(path, None, &[], &source_attributes())
        .await;
    assert!(matches!(result, Err(AssetError::Validation(_))));
}

#[tokio::test]
async fn eager_failure_keeps_earlier_successes() {
    let rig = rig(1).await;
    let (asset, original) =
        store_ready_asset(&rig.repo, rig.store.as_ref(), "/photos/eager-partial").await;
    let path = AssetPath::parse("/photos/eager-partial").unwrap();

    rig.pipeline.fail_from_call(2);
    let result = rig
        .service
        .generate_eager(
            path,
            Some(asset.entry_id),
            &[webp_resize(100, 75), webp_resize(200, 150)],
            &original.attributes().unwrap(),
        )
        .await;
    assert!(matches!(result, Err(AssetError::Transient(_))));

    // The variant generated before the failure stays persisted and ready.
    let survivors = asset_variant::Entity::find()
        .filter(asset_variant::Column::AssetId.eq(asset.id))
        .filter(asset_variant::Column::IsOriginalVariant.eq(false))
        .all(&rig.harness.db)
        .await
        .unwrap();
    assert_eq!(survivors.len(), 1);
    assert_eq!((survivors[0].width, survivors[0].height), (100, 75));
    assert_eq!(survivors[0].state, common::LifecycleState::Ready);
}

#[tokio::test]
async fn pre_process_returns_attributes_and_lqip() {
    let rig = rig(1).await;

    let outcome = rig
        .service
        .pre_process(
            b"raw-upload".to_vec(),
            PreprocessSettings {
                format: Some(ImageFormat::Webp),
                fix_orientation: true,
                first_frame_only: true,
            },
            vec![LqipKind::Blurhash],
            "assets".to_string(),
        )
        .await
        .expect("pre-process should succeed");

    assert_eq!(outcome.attributes.format, ImageFormat::Webp);
    assert_eq!(outcome.attributes.page_count, 1);
    let lqip = outcome.lqip.expect("lqip payload expected");
    assert!(lqip.get(LqipKind::Blurhash).is_some());
    assert!(
        rig.store
            .exists(&outcome.location.bucket, &outcome.location.key)
            .await
            .unwrap()
    );
}
