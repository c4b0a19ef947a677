use common::{AssetSource, LifecycleState};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One logical image registered at a hierarchical path.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tree-path value, e.g. `root.photos.cats`. Descendant queries are
    /// prefix matches over this column.
    #[sea_orm(indexed)]
    pub path: String,

    /// Strictly increasing per path, assigned at creation. The most recent
    /// asset at a path is the ready row with the highest entry_id.
    pub entry_id: i64,

    pub alt: Option<String>,

    /// Key -> value string map.
    #[sea_orm(column_type = "JsonBinary")]
    pub labels: serde_json::Value,

    /// Array of strings.
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: serde_json::Value,

    pub source: AssetSource,

    /// Present iff `source` is `Url`.
    pub source_url: Option<String>,

    #[sea_orm(indexed)]
    pub state: LifecycleState,

    pub created_at: DateTimeUtc,

    #[sea_orm(has_many)]
    pub variants: HasMany<super::asset_variant::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when this asset carries every label pair in `wanted`.
    pub fn has_labels<'a>(
        &self,
        mut wanted: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> bool {
        let Some(labels) = self.labels.as_object() else {
            return false;
        };
        wanted.all(|(key, value)| labels.get(key).and_then(|v| v.as_str()) == Some(value))
    }
}
