use std::collections::BTreeMap;

use common::attributes::VariantAttributes;
use common::transformation::{FitMode, ImageFormat, Transformation};
use common::{AssetError, AssetPath};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use server::entity::{asset, asset_variant, outbox_event};
use server::repository::{StoreVariantRequest, VariantSelector};

use crate::common::{MemoryObjectStore, store_ready_asset, store_request};

fn resize(width: u32, height: u32) -> Transformation {
    Transformation {
        width,
        height,
        format: ImageFormat::Webp,
        fit: FitMode::Fit,
        quality: 80,
        original_variant: false,
        ..Transformation::ORIGINAL
    }
}

fn variant_request(width: u32, height: u32) -> StoreVariantRequest {
    StoreVariantRequest {
        bucket: "assets".to_string(),
        transformation: resize(width, height),
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

#[tokio::test]
async fn entry_ids_increase_and_most_recent_wins() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();
    let path = AssetPath::parse("/photos/cats").unwrap();

    let (first, _) = store_ready_asset(&repo, &store, "/photos/cats").await;
    let (second, _) = store_ready_asset(&repo, &store, "/photos/cats").await;
    assert_eq!(first.entry_id, 0);
    assert_eq!(second.entry_id, 1);

    let latest = repo
        .fetch_by_path(&path, None, VariantSelector::All, None)
        .await
        .unwrap()
        .expect("most recent asset should exist");
    assert_eq!(latest.asset.entry_id, 1);
    assert_eq!(latest.asset.id, second.id);

    let oldest = repo
        .fetch_by_path(&path, Some(0), VariantSelector::All, None)
        .await
        .unwrap()
        .expect("entry 0 should exist");
    assert_eq!(oldest.asset.id, first.id);
}

#[tokio::test]
async fn pending_assets_are_invisible_to_fetch() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let path = AssetPath::parse("/drafts/logo").unwrap();

    repo.store_pending(store_request("/drafts/logo"))
        .await
        .unwrap();

    let fetched = repo
        .fetch_by_path(&path, None, VariantSelector::All, None)
        .await
        .unwrap();
    assert!(fetched.is_none());
}

#[tokio::test]
async fn store_variant_requires_existing_ready_asset() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let path = AssetPath::parse("/missing/asset").unwrap();

    let result = repo
        .store_variant_pending(&path, None, variant_request(100, 75))
        .await;
    assert!(matches!(result, Err(AssetError::NotFound(_))));
}

#[tokio::test]
async fn duplicate_transformation_key_is_a_conflict() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();
    let path = AssetPath::parse("/photos/dup").unwrap();
    store_ready_asset(&repo, &store, "/photos/dup").await;

    let (_, first) = repo
        .store_variant_pending(&path, None, variant_request(100, 75))
        .await
        .unwrap();
    repo.mark_variant_ready(first.id).await.unwrap();

    let second = repo
        .store_variant_pending(&path, None, variant_request(100, 75))
        .await;
    assert!(matches!(second, Err(AssetError::Conflict(_))));

    let count = asset_variant::Entity::find()
        .filter(asset_variant::Column::TransformationKey.eq(resize(100, 75).key().to_hex()))
        .count(&harness.db)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn variant_selector_filters_by_key_and_original() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();
    let path = AssetPath::parse("/photos/select").unwrap();
    let (_, original) = store_ready_asset(&repo, &store, "/photos/select").await;

    let (_, variant) = repo
        .store_variant_pending(&path, None, variant_request(320, 240))
        .await
        .unwrap();
    repo.mark_variant_ready(variant.id).await.unwrap();

    let by_key = repo
        .fetch_by_path(
            &path,
            None,
            VariantSelector::Key(resize(320, 240).key()),
            None,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_key.variants.len(), 1);
    assert_eq!(by_key.variants[0].id, variant.id);

    let only_original = repo
        .fetch_by_path(&path, None, VariantSelector::Original, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(only_original.variants.len(), 1);
    assert_eq!(only_original.variants[0].id, original.id);
    assert!(only_original.variants[0].is_original_variant);

    let all = repo
        .fetch_by_path(&path, None, VariantSelector::All, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(all.variants.len(), 2);
}

#[tokio::test]
async fn label_filters_use_and_semantics() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let path = AssetPath::parse("/photos/labeled").unwrap();

    let mut request = store_request("/photos/labeled");
    request.labels = BTreeMap::from([
        ("campaign".to_string(), "spring".to_string()),
        ("team".to_string(), "design".to_string()),
    ]);
    let (stored, _) = repo.store_pending(request).await.unwrap();
    repo.mark_asset_ready(stored.id).await.unwrap();

    let matching = BTreeMap::from([("campaign".to_string(), "spring".to_string())]);
    let found = repo
        .fetch_by_path(&path, None, VariantSelector::All, Some(&matching))
        .await
        .unwrap();
    assert!(found.is_some());

    let partial_mismatch = BTreeMap::from([
        ("campaign".to_string(), "spring".to_string()),
        ("team".to_string(), "marketing".to_string()),
    ]);
    let missed = repo
        .fetch_by_path(&path, None, VariantSelector::All, Some(&partial_mismatch))
        .await
        .unwrap();
    assert!(missed.is_none());
}

#[tokio::test]
async fn delete_returns_locations_and_writes_outbox_events() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();
    let path = AssetPath::parse("/photos/doomed").unwrap();
    store_ready_asset(&repo, &store, "/photos/doomed").await;

    let locations = repo.delete_asset_by_path(&path, None).await.unwrap();
    assert_eq!(locations.len(), 1);

    let events = outbox_event::Entity::find().all(&harness.db).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].payload["objectStoreKey"].as_str(),
        Some(locations[0].key.as_str())
    );

    let remaining = asset::Entity::find().count(&harness.db).await.unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn recursive_delete_spares_siblings() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();

    store_ready_asset(&repo, &store, "/photos/cats").await;
    store_ready_asset(&repo, &store, "/photos/cats/kittens").await;
    store_ready_asset(&repo, &store, "/photos/dogs").await;

    let cats = AssetPath::parse("/photos/cats").unwrap();
    let locations = repo.delete_assets_by_path(&cats, true).await.unwrap();
    assert_eq!(locations.len(), 2);

    let remaining = asset::Entity::find().all(&harness.db).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, "root.photos.dogs");
}

#[tokio::test]
async fn non_recursive_delete_keeps_descendants() {
    let harness = crate::common::TestDb::spawn().await;
    let repo = harness.repository();
    let store = MemoryObjectStore::new();

    store_ready_asset(&repo, &store, "/photos/cats").await;
    store_ready_asset(&repo, &store, "/photos/cats/kittens").await;

    let cats = AssetPath::parse("/photos/cats").unwrap();
    let locations = repo.delete_assets_by_path(&cats, false).await.unwrap();
    assert_eq!(locations.len(), 1);

    let remaining = asset::Entity::find().all(&harness.db).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].path, "root.photos.cats.kittens");
}
