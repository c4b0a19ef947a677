use serde::{Deserialize, Serialize};

use crate::transformation::ImageFormat;

/// Intrinsic properties of the stored bytes of one variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAttributes {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Number of pages/frames in the source (1 for plain still images).
    pub page_count: u32,
    /// Animation loop count, 0 = loop forever. Meaningless when `page_count` is 1.
    pub loops: u32,
}

impl VariantAttributes {
    /// Width / height as a ratio, used for FIT dimension derivation.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Supported low-quality-image-placeholder encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LqipKind {
    Blurhash,
    Thumbhash,
}

impl LqipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blurhash => "blurhash",
            Self::Thumbhash => "thumbhash",
        }
    }
}

/// Precomputed placeholder strings for fast perceived loading.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LqipPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blurhash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbhash: Option<String>,
}

impl LqipPayload {
    pub fn is_empty(&self) -> bool {
        self.blurhash.is_none() && self.thumbhash.is_none()
    }

    pub fn set(&mut self, kind: LqipKind, value: String) {
        match kind {
            LqipKind::Blurhash => self.blurhash = Some(value),
            LqipKind::Thumbhash => self.thumbhash = Some(value),
        }
    }

    pub fn get(&self, kind: LqipKind) -> Option<&str> {
        match kind {
            LqipKind::Blurhash => self.blurhash.as_deref(),
            LqipKind::Thumbhash => self.thumbhash.as_deref(),
        }
    }
}
