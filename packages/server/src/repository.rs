use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use common::attributes::{LqipPayload, VariantAttributes};
use common::storage::ObjectLocation;
use common::transformation::{OriginalAttributeSource, Transformation, TransformationKey};
use common::{AssetError, AssetPath, AssetSource, LifecycleState};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::entity::{asset, asset_variant};
use crate::error::map_db_err;
use crate::outbox::OutboxService;

/// Attempts at allocating a per-path entry id before giving up. A lost race
/// shows up as a unique violation on (path, entry_id) and is retried with a
/// fresh read.
const ENTRY_ALLOCATION_ATTEMPTS: usize = 3;

/// New-asset payload for [`AssetRepository::store_pending`].
#[derive(Clone, Debug)]
pub struct StoreAssetRequest {
    pub path: AssetPath,
    pub alt: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
    pub source: AssetSource,
    pub source_url: Option<String>,
    /// Bucket the original bytes will be written to.
    pub bucket: String,
    /// Attributes of the preprocessed original bytes.
    pub attributes: VariantAttributes,
    pub lqip: Option<LqipPayload>,
}

/// New-variant payload for [`AssetRepository::store_variant_pending`].
#[derive(Clone, Debug)]
pub struct StoreVariantRequest {
    pub bucket: String,
    pub transformation: Transformation,
    pub attributes: VariantAttributes,
    pub lqip: Option<LqipPayload>,
}

/// Which variants of an asset a fetch returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariantSelector {
    /// All ready variants.
    All,
    /// Only the stored original.
    Original,
    /// The variant matching this transformation key, if any.
    Key(TransformationKey),
}

/// An asset together with the variants the selector matched.
#[derive(Clone, Debug)]
pub struct FetchedAsset {
    pub asset: asset::Model,
    pub variants: Vec<asset_variant::Model>,
}

/// Transactional store of the asset/variant pending→ready state machine.
///
/// The database is the sole arbiter of that state machine: rows are inserted
/// `Pending` before any object-store write, promoted `Ready` only after the
/// bytes are confirmed, and dedup races between concurrent workers are
/// resolved by the (asset_id, transformation_key) uniqueness index rather
/// than in-process locking.
#[derive(Clone)]
pub struct AssetRepository {
    db: DatabaseConnection,
}

impl AssetRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Insert a pending asset and its pending original-variant row,
    /// allocating the next entry id for the path.
    ///
    /// The max-read plus insert races against concurrent stores at the same
    /// path; the unique (path, entry_id) index rejects the loser, which
    /// retries with a fresh read.
    pub async fn store_pending(
        &self,
        request: StoreAssetRequest,
    ) -> Result<(asset::Model, asset_variant::Model), AssetError> {
        let tree = request.path.tree();

        for _attempt in 0..ENTRY_ALLOCATION_ATTEMPTS {
            let txn = self.db.begin().await.map_err(map_db_err)?;

            let current_max = asset::Entity::find()
                .filter(asset::Column::Path.eq(tree.clone()))
                .order_by_desc(asset::Column::EntryId)
                .lock(LockType::Update)
                .one(&txn)
                .await
                .map_err(map_db_err)?
                .map(|existing| existing.entry_id);
            let entry_id = current_max.map_or(0, |max| max + 1);

            let now = Utc::now();
            let asset_model = asset::ActiveModel {
                id: Set(Uuid::new_v4()),
                path: Set(tree.clone()),
                entry_id: Set(entry_id),
                alt: Set(request.alt.clone()),
                labels: Set(serde_json::to_value(&request.labels).unwrap_or_default()),
                tags: Set(serde_json::to_value(&request.tags).unwrap_or_default()),
                source: Set(request.source),
                source_url: Set(request.source_url.clone()),
                state: Set(LifecycleState::Pending),
                created_at: Set(now),
                ..Default::default()
            };

            let inserted = match asset_model.insert(&txn).await {
                Ok(inserted) => inserted,
                Err(e) if is_unique_violation(&e) => {
                    txn.rollback().await.map_err(map_db_err)?;
                    continue;
                }
                Err(e) => return Err(map_db_err(e)),
            };

            let variant = insert_variant_row(
                &txn,
                inserted.id,
                StoreVariantRequest {
                    bucket: request.bucket.clone(),
                    transformation: Transformation::ORIGINAL,
                    attributes: request.attributes,
                    lqip: request.lqip.clone(),
                },
            )
            .await?;

            txn.commit().await.map_err(map_db_err)?;

            info!(
                path = %request.path,
                entry_id,
                asset_id = %inserted.id,
                "Stored pending asset"
            );
            return Ok((inserted, variant));
        }

        Err(AssetError::conflict(format!(
            "could not allocate entry id for path {} after {ENTRY_ALLOCATION_ATTEMPTS} attempts",
            request.path
        )))
    }

    /// Insert a pending variant row for an existing asset.
    ///
    /// Fails with `NotFound` when no ready asset matches (path, entry_id)
    /// and with `Conflict` when a variant with the same transformation key
    /// already holds the uniqueness slot.
    pub async fn store_variant_pending(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
        request: StoreVariantRequest,
    ) -> Result<(asset::Model, asset_variant::Model), AssetError> {
        let owner = self
            .resolve_ready_asset(path, entry_id)
            .await?
            .ok_or_else(|| {
                AssetError::not_found(format!("no ready asset at {path} (entry {entry_id:?})"))
            })?;

        let txn = self.db.begin().await.map_err(map_db_err)?;
        let variant = insert_variant_row(&txn, owner.id, request).await?;
        txn.commit().await.map_err(map_db_err)?;

        Ok((owner, variant))
    }

    /// Record object-store coordinates after the bytes were written.
    pub async fn record_variant_object(
        &self,
        variant_id: Uuid,
        location: &ObjectLocation,
    ) -> Result<asset_variant::Model, AssetError> {
        let update = asset_variant::ActiveModel {
            id: Set(variant_id),
            object_store_bucket: Set(location.bucket.clone()),
            object_store_key: Set(Some(location.key.clone())),
            ..Default::default()
        };
        update.update(&self.db).await.map_err(map_db_err)
    }

    /// Promote a variant to ready. Terminal; never reversed.
    pub async fn mark_variant_ready(
        &self,
        variant_id: Uuid,
    ) -> Result<asset_variant::Model, AssetError> {
        let update = asset_variant::ActiveModel {
            id: Set(variant_id),
            state: Set(LifecycleState::Ready),
            ..Default::default()
        };
        update.update(&self.db).await.map_err(map_db_err)
    }

    /// Promote an asset and its original variant to ready in one
    /// transaction.
    pub async fn mark_asset_ready(&self, asset_id: Uuid) -> Result<asset::Model, AssetError> {
        let txn = self.db.begin().await.map_err(map_db_err)?;

        let update = asset::ActiveModel {
            id: Set(asset_id),
            state: Set(LifecycleState::Ready),
            ..Default::default()
        };
        let updated = update.update(&txn).await.map_err(map_db_err)?;

        let original = asset_variant::Entity::find()
            .filter(asset_variant::Column::AssetId.eq(asset_id))
            .filter(asset_variant::Column::IsOriginalVariant.eq(true))
            .one(&txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| {
                AssetError::transient(format!("asset {asset_id} has no original variant row"))
            })?;

        let variant_update = asset_variant::ActiveModel {
            id: Set(original.id),
            state: Set(LifecycleState::Ready),
            ..Default::default()
        };
        variant_update.update(&txn).await.map_err(map_db_err)?;

        txn.commit().await.map_err(map_db_err)?;
        Ok(updated)
    }

    /// Fetch a ready asset and its matching variants.
    ///
    /// `entry_id` of `None` selects the most recent ready asset at the path.
    /// Label filters are conjunctive: the asset must carry every given pair.
    pub async fn fetch_by_path(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
        selector: VariantSelector,
        labels: Option<&BTreeMap<String, String>>,
    ) -> Result<Option<FetchedAsset>, AssetError> {
        let mut query = asset::Entity::find()
            .filter(asset::Column::Path.eq(path.tree()))
            .filter(asset::Column::State.eq(LifecycleState::Ready))
            .order_by_desc(asset::Column::EntryId);
        if let Some(entry_id) = entry_id {
            query = query.filter(asset::Column::EntryId.eq(entry_id));
        }

        let candidates = query.all(&self.db).await.map_err(map_db_err)?;
        let Some(found) = candidates.into_iter().find(|candidate| match labels {
            Some(wanted) => {
                candidate.has_labels(wanted.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
            None => true,
        }) else {
            return Ok(None);
        };

        let mut variant_query = asset_variant::Entity::find()
            .filter(asset_variant::Column::AssetId.eq(found.id))
            .filter(asset_variant::Column::State.eq(LifecycleState::Ready))
            .order_by_asc(asset_variant::Column::CreatedAt);
        variant_query = match &selector {
            VariantSelector::All => variant_query,
            VariantSelector::Original => {
                variant_query.filter(asset_variant::Column::IsOriginalVariant.eq(true))
            }
            VariantSelector::Key(key) => {
                variant_query.filter(asset_variant::Column::TransformationKey.eq(key.to_hex()))
            }
        };

        let variants = variant_query.all(&self.db).await.map_err(map_db_err)?;
        Ok(Some(FetchedAsset {
            asset: found,
            variants,
        }))
    }

    /// Delete one asset (its variants cascade) and return the object
    /// locations that held bytes. The same locations are also written to the
    /// outbox in the deleting transaction, so cleanup survives a caller that
    /// crashes before physically deleting.
    pub async fn delete_asset_by_path(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
    ) -> Result<Vec<ObjectLocation>, AssetError> {
        let target = self
            .resolve_ready_asset(path, entry_id)
            .await?
            .ok_or_else(|| {
                AssetError::not_found(format!("no ready asset at {path} (entry {entry_id:?})"))
            })?;

        let txn = self.db.begin().await.map_err(map_db_err)?;
        let locations = delete_assets_in_txn(&txn, vec![target]).await?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(locations)
    }

    /// Delete every asset at `path`, and with `recursive` every asset
    /// hierarchically beneath it. Siblings are untouched.
    pub async fn delete_assets_by_path(
        &self,
        path: &AssetPath,
        recursive: bool,
    ) -> Result<Vec<ObjectLocation>, AssetError> {
        let mut condition = Condition::any().add(asset::Column::Path.eq(path.tree()));
        if recursive {
            condition = condition.add(asset::Column::Path.like(path.descendant_pattern()));
        }

        let txn = self.db.begin().await.map_err(map_db_err)?;
        let targets = asset::Entity::find()
            .filter(condition)
            .lock(LockType::Update)
            .all(&txn)
            .await
            .map_err(map_db_err)?;

        let locations = delete_assets_in_txn(&txn, targets).await?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(locations)
    }

    /// The ready asset addressed by (path, entry_id), most recent when
    /// `entry_id` is omitted.
    async fn resolve_ready_asset(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
    ) -> Result<Option<asset::Model>, AssetError> {
        let mut query = asset::Entity::find()
            .filter(asset::Column::Path.eq(path.tree()))
            .filter(asset::Column::State.eq(LifecycleState::Ready))
            .order_by_desc(asset::Column::EntryId);
        if let Some(entry_id) = entry_id {
            query = query.filter(asset::Column::EntryId.eq(entry_id));
        }
        query.one(&self.db).await.map_err(map_db_err)
    }
}

/// Normalizer collaborator: attributes of the stored original at a path.
#[async_trait]
impl OriginalAttributeSource for AssetRepository {
    async fn original_attributes(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
    ) -> Result<VariantAttributes, AssetError> {
        let fetched = self
            .fetch_by_path(path, entry_id, VariantSelector::Original, None)
            .await?
            .ok_or_else(|| AssetError::not_found(format!("no ready asset at {path}")))?;

        let original = fetched.variants.first().ok_or_else(|| {
            AssetError::not_found(format!("asset at {path} has no original variant"))
        })?;
        original.attributes()
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Insert one pending variant row; a uniqueness-index loss surfaces as
/// `Conflict`.
async fn insert_variant_row(
    txn: &DatabaseTransaction,
    asset_id: Uuid,
    request: StoreVariantRequest,
) -> Result<asset_variant::Model, AssetError> {
    let is_original = request.transformation.is_original();
    let transformation_json = if is_original {
        None
    } else {
        Some(serde_json::to_value(&request.transformation).unwrap_or_default())
    };

    let model = asset_variant::ActiveModel {
        id: Set(Uuid::new_v4()),
        asset_id: Set(asset_id),
        object_store_bucket: Set(request.bucket),
        object_store_key: Set(None),
        width: Set(request.attributes.width as i32),
        height: Set(request.attributes.height as i32),
        format: Set(request.attributes.format.as_str().to_string()),
        page_count: Set(request.attributes.page_count as i32),
        loops: Set(request.attributes.loops as i32),
        transformation: Set(transformation_json),
        transformation_key: Set(request.transformation.key().to_hex()),
        is_original_variant: Set(is_original),
        lqip: Set(request
            .lqip
            .as_ref()
            .map(|lqip| serde_json::to_value(lqip).unwrap_or_default())),
        state: Set(LifecycleState::Pending),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match model.insert(txn).await {
        Ok(inserted) => Ok(inserted),
        Err(e) if is_unique_violation(&e) => Err(AssetError::conflict(format!(
            "variant with transformation key {} already exists for asset {asset_id}",
            request.transformation.key()
        ))),
        Err(e) => Err(map_db_err(e)),
    }
}

/// Delete the given assets and their variants, collecting and outboxing the
/// object locations that actually held bytes.
async fn delete_assets_in_txn(
    txn: &DatabaseTransaction,
    targets: Vec<asset::Model>,
) -> Result<Vec<ObjectLocation>, AssetError> {
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = targets.iter().map(|a| a.id).collect();
    let variants = asset_variant::Entity::find()
        .filter(asset_variant::Column::AssetId.is_in(ids.clone()))
        .all(txn)
        .await
        .map_err(map_db_err)?;

    let outbox = OutboxService::new(txn);
    let mut locations = Vec::new();
    for variant in &variants {
        if let Some(key) = &variant.object_store_key {
            let location = ObjectLocation::new(variant.object_store_bucket.clone(), key.clone());
            outbox
                .enqueue_reap(location.clone())
                .await
                .map_err(map_db_err)?;
            locations.push(location);
        }
    }

    asset_variant::Entity::delete_many()
        .filter(asset_variant::Column::AssetId.is_in(ids.clone()))
        .exec(txn)
        .await
        .map_err(map_db_err)?;
    asset::Entity::delete_many()
        .filter(asset::Column::Id.is_in(ids))
        .exec(txn)
        .await
        .map_err(map_db_err)?;

    info!(
        assets = targets.len(),
        objects = locations.len(),
        "Deleted assets and scheduled object reaps"
    );
    Ok(locations)
}
