use std::time::Duration;

use chrono::Utc;
use common::AssetPath;
use common::storage::{ObjectLocation, ObjectStore};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use server::entity::{asset, asset_variant, outbox_event};
use server::outbox::OutboxService;
use server::sweeper::{reap_outbox_events, sweep_failed_assets, sweep_failed_variants};

use crate::common::{MemoryObjectStore, TestDb, store_ready_asset, store_request};

const HOUR: Duration = Duration::from_secs(3600);

fn variant_request(width: u32, height: u32) -> server::repository::StoreVariantRequest {
    use common::attributes::VariantAttributes;
    use common::transformation::{FitMode, ImageFormat, Transformation};

    server::repository::StoreVariantRequest {
        bucket: "assets".to_string(),
        transformation: Transformation {
            width,
            height,
            format: ImageFormat::Webp,
            fit: FitMode::Fit,
            quality: 80,
            original_variant: false,
            ..Transformation::ORIGINAL
        },
        attributes: VariantAttributes {
            width,
            height,
            format: ImageFormat::Webp,
            page_count: 1,
            loops: 0,
        },
        lqip: None,
    }
}

async fn age_asset(harness: &TestDb, id: uuid::Uuid, age: Duration) {
    let update = asset::ActiveModel {
        id: Set(id),
        created_at: Set(Utc::now() - chrono::Duration::from_std(age).unwrap()),
        ..Default::default()
    };
    update.update(&harness.db).await.unwrap();
}

async fn age_variant(harness: &TestDb, id: uuid::Uuid, age: Duration) {
    let update = asset_variant::ActiveModel {
        id: Set(id),
        created_at: Set(Utc::now() - chrono::Duration::from_std(age).unwrap()),
        ..Default::default()
    };
    update.update(&harness.db).await.unwrap();
}

#[tokio::test]
async fn stuck_pending_asset_is_reclaimed_with_one_reap_event() {
    let harness = TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();

    // Stuck: pending, bytes already written, older than the threshold.
    let (stuck, original) = repo.store_pending(store_request("/stuck/old")).await.unwrap();
    let location = store.persist("assets", b"orphaned-bytes").await.unwrap();
    repo.record_variant_object(original.id, &location)
        .await
        .unwrap();
    age_asset(&harness, stuck.id, 2 * HOUR).await;

    let deleted = sweep_failed_assets(&harness.db, HOUR).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(
        asset::Entity::find_by_id(stuck.id)
            .one(&harness.db)
            .await
            .unwrap()
            .is_none()
    );

    let events = outbox_event::Entity::find().all(&harness.db).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].payload["objectStoreKey"].as_str(),
        Some(location.key.as_str())
    );
}

#[tokio::test]
async fn fresh_and_ready_assets_are_never_swept() {
    let harness = TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();

    // Fresh pending asset: inside the staleness window.
    repo.store_pending(store_request("/stuck/fresh"))
        .await
        .unwrap();

    // Ready asset, aged well past the threshold.
    let (ready, _) = store_ready_asset(&repo, &store, "/stuck/ready").await;
    age_asset(&harness, ready.id, 48 * HOUR).await;

    let deleted = sweep_failed_assets(&harness.db, HOUR).await.unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(asset::Entity::find().count(&harness.db).await.unwrap(), 2);
}

#[tokio::test]
async fn stuck_asset_without_bytes_is_deleted_without_reap_event() {
    let harness = TestDb::spawn().await;
    let repo = harness.repository();

    let (stuck, _) = repo.store_pending(store_request("/stuck/no-bytes")).await.unwrap();
    age_asset(&harness, stuck.id, 2 * HOUR).await;

    let deleted = sweep_failed_assets(&harness.db, HOUR).await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(
        outbox_event::Entity::find().count(&harness.db).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn stuck_pending_variant_on_ready_asset_is_reclaimed() {
    let harness = TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();
    store_ready_asset(&repo, &store, "/variants/stuck").await;
    let path = AssetPath::parse("/variants/stuck").unwrap();

    let (_, pending) = repo
        .store_variant_pending(&path, None, variant_request(64, 48))
        .await
        .unwrap();
    let location = store.persist("assets", b"halfway").await.unwrap();
    repo.record_variant_object(pending.id, &location)
        .await
        .unwrap();
    age_variant(&harness, pending.id, HOUR).await;

    let deleted = sweep_failed_variants(&harness.db, Duration::from_secs(1800))
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    assert!(
        asset_variant::Entity::find_by_id(pending.id)
            .one(&harness.db)
            .await
            .unwrap()
            .is_none()
    );
    let events = outbox_event::Entity::find().all(&harness.db).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn variants_of_pending_assets_are_left_to_the_asset_sweeper() {
    let harness = TestDb::spawn().await;
    let repo = harness.repository();

    let (stuck, original) = repo
        .store_pending(store_request("/variants/owner-pending"))
        .await
        .unwrap();
    age_asset(&harness, stuck.id, 2 * HOUR).await;
    age_variant(&harness, original.id, 2 * HOUR).await;

    let deleted = sweep_failed_variants(&harness.db, Duration::from_secs(1800))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
    assert!(
        asset_variant::Entity::find_by_id(original.id)
            .one(&harness.db)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn ready_variants_survive_the_variant_sweep() {
    let harness = TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();

    let (_, original) = store_ready_asset(&repo, &store, "/variants/ready").await;
    age_variant(&harness, original.id, 48 * HOUR).await;

    let deleted = sweep_failed_variants(&harness.db, Duration::from_secs(1800))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn reaper_deletes_bytes_then_the_event_row() {
    let harness = TestDb::spawn().await;
    let store = MemoryObjectStore::new();

    let location = store.persist("assets", b"doomed").await.unwrap();
    OutboxService::new(&harness.db)
        .enqueue_reap(location.clone())
        .await
        .unwrap();

    let reaped = reap_outbox_events(&harness.db, &store, 100).await.unwrap();
    assert_eq!(reaped, 1);
    assert!(!store.exists(&location.bucket, &location.key).await.unwrap());
    assert_eq!(
        outbox_event::Entity::find().count(&harness.db).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn failed_reap_leaves_the_event_for_retry() {
    let harness = TestDb::spawn().await;
    let store = MemoryObjectStore::new();

    let location = store.persist("assets", b"sticky").await.unwrap();
    OutboxService::new(&harness.db)
        .enqueue_reap(location.clone())
        .await
        .unwrap();

    store.set_fail_deletes(true);
    let reaped = reap_outbox_events(&harness.db, &store, 100).await.unwrap();
    assert_eq!(reaped, 0);
    assert_eq!(
        outbox_event::Entity::find().count(&harness.db).await.unwrap(),
        1
    );

    store.set_fail_deletes(false);
    let reaped = reap_outbox_events(&harness.db, &store, 100).await.unwrap();
    assert_eq!(reaped, 1);
    assert_eq!(
        outbox_event::Entity::find().count(&harness.db).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn failing_events_do_not_starve_fresh_ones() {
    let harness = TestDb::spawn().await;
    let store = MemoryObjectStore::new();
    let outbox = OutboxService::new(&harness.db);

    outbox
        .enqueue_reap(ObjectLocation::new("assets", "old-1"))
        .await
        .unwrap();
    outbox
        .enqueue_reap(ObjectLocation::new("assets", "old-2"))
        .await
        .unwrap();

    // First pass fills the whole batch with the two old events and fails.
    store.set_fail_deletes(true);
    let reaped = reap_outbox_events(&harness.db, &store, 2).await.unwrap();
    assert_eq!(reaped, 0);

    // A newer event arrives after the failures.
    outbox
        .enqueue_reap(ObjectLocation::new("assets", "fresh"))
        .await
        .unwrap();

    // The next pass must attempt the never-tried event ahead of the
    // repeatedly-failing ones.
    let reaped = reap_outbox_events(&harness.db, &store, 2).await.unwrap();
    assert_eq!(reaped, 0);

    let events = outbox_event::Entity::find().all(&harness.db).await.unwrap();
    let fresh = events
        .iter()
        .find(|e| e.payload["objectStoreKey"] == "fresh")
        .unwrap();
    assert_eq!(fresh.attempts, 1);
}

#[tokio::test]
async fn reaping_an_already_gone_object_still_consumes_the_event() {
    let harness = TestDb::spawn().await;
    let store = MemoryObjectStore::new();

    // The object was never written (or already deleted by a prior pass).
    OutboxService::new(&harness.db)
        .enqueue_reap(ObjectLocation::new("assets", "deadbeef00"))
        .await
        .unwrap();

    let reaped = reap_outbox_events(&harness.db, &store, 100).await.unwrap();
    assert_eq!(reaped, 1);
    assert_eq!(
        outbox_event::Entity::find().count(&harness.db).await.unwrap(),
        0
    );
}
