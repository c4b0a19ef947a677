#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Persistence state of an asset or variant.
///
/// Rows are created `Pending` and promoted to `Ready` only once the
/// corresponding object-store bytes are confirmed written. `Ready` is never
/// demoted; the only other exit from `Pending` is deletion by a sweeper.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in
/// SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "PascalCase")]
pub enum LifecycleState {
    /// Row inserted, bytes not yet durably confirmed.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Pending"))]
    Pending,
    /// Bytes persisted, row visible to fetches.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Ready"))]
    Ready,
}

impl LifecycleState {
    pub const ALL: &'static [LifecycleState] = &[Self::Pending, Self::Ready];

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Pending
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Ready" => Ok(Self::Ready),
            _ => Err(format!(
                "Invalid lifecycle state '{s}'. Must be 'Pending' or 'Ready'"
            )),
        }
    }
}

/// How the source bytes of an asset were obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "PascalCase")]
pub enum AssetSource {
    /// Bytes uploaded directly by the client.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Upload"))]
    Upload,
    /// Bytes registered from a remote URL.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "Url"))]
    Url,
}

impl AssetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::Url => "Url",
        }
    }
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Upload" => Ok(Self::Upload),
            "Url" => Ok(Self::Url),
            _ => Err(format!(
                "Invalid asset source '{s}'. Must be 'Upload' or 'Url'"
            )),
        }
    }
}
