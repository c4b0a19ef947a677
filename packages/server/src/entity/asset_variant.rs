use std::str::FromStr;

use common::attributes::VariantAttributes;
use common::transformation::ImageFormat;
use common::{AssetError, LifecycleState};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One rendered/stored representation of an asset.
///
/// Within one asset, `transformation_key` is unique: no two variants with
/// identical normalized parameters can coexist. The uniqueness index is
/// created by `database::ensure_indexes`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset_variant")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub asset_id: Uuid,

    #[sea_orm(belongs_to, from = "asset_id", to = "id")]
    pub asset: Option<super::asset::Entity>,

    pub object_store_bucket: String,

    /// Recorded only after the bytes are confirmed written; a pending row
    /// without a key has no object to reap.
    pub object_store_key: Option<String>,

    pub width: i32,
    pub height: i32,
    pub format: String,
    pub page_count: i32,
    pub loops: i32,

    /// Normalized parameters that produced this variant; null for the
    /// original.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub transformation: Option<serde_json::Value>,

    /// Canonical dedup key, 64 hex characters.
    #[sea_orm(indexed)]
    pub transformation_key: String,

    #[sea_orm(default_value = false)]
    pub is_original_variant: bool,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub lqip: Option<serde_json::Value>,

    #[sea_orm(indexed)]
    pub state: LifecycleState,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Intrinsic attributes of the stored bytes.
    pub fn attributes(&self) -> Result<VariantAttributes, AssetError> {
        Ok(VariantAttributes {
            width: self.width as u32,
            height: self.height as u32,
            format: ImageFormat::from_str(&self.format)?,
            page_count: self.page_count as u32,
            loops: self.loops as u32,
        })
    }
}
