use async_trait::async_trait;

use crate::attributes::{LqipKind, VariantAttributes};
use crate::error::AssetError;
use crate::transformation::{ImageFormat, Transformation};

/// Output of one pipeline invocation.
#[derive(Clone, Debug)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub attributes: VariantAttributes,
    /// True iff the transformation changed pixel content enough that
    /// previously-computed LQIPs are stale. Blur and padding alone never set
    /// this.
    pub requires_lqip_regeneration: bool,
}

/// Preprocessing applied to first-time ingestions, per path configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PreprocessSettings {
    /// Convert to this format on ingest; `None` keeps the uploaded format.
    pub format: Option<ImageFormat>,
    /// Apply the EXIF orientation and strip the tag.
    #[serde(default)]
    pub fix_orientation: bool,
    /// Keep only the first frame/page of multi-page sources.
    #[serde(default)]
    pub first_frame_only: bool,
}

/// The external pixel-transformation engine, consumed as a black box.
///
/// Invocations may block a worker for the duration of one transform, which is
/// why the generator pool size is bounded independently of I/O concurrency.
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Apply a fully-normalized transformation to decoded source bytes.
    async fn process(
        &self,
        source: &[u8],
        source_attributes: &VariantAttributes,
        transformation: &Transformation,
    ) -> Result<ProcessedImage, AssetError>;

    /// Normalize first-time ingested bytes to the path's preprocessing
    /// configuration.
    async fn preprocess(
        &self,
        source: &[u8],
        settings: &PreprocessSettings,
    ) -> Result<ProcessedImage, AssetError>;
}

/// One low-quality-placeholder encoder (blurhash, thumbhash, ...).
pub trait LqipGenerator: Send + Sync {
    fn kind(&self) -> LqipKind;

    /// Encode a placeholder string from processed image bytes.
    fn generate(
        &self,
        bytes: &[u8],
        attributes: &VariantAttributes,
    ) -> Result<String, AssetError>;
}
