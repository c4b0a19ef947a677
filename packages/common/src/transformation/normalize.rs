use async_trait::async_trait;

use crate::attributes::VariantAttributes;
use crate::error::AssetError;
use crate::path::AssetPath;

use super::{
    FitMode, Flip, Rotation, Transformation, TransformationRequest, canonical_orientation,
    parse_background,
};

/// Lookup collaborator for the attributes of an asset's stored original.
///
/// Implemented by the repository layer; the normalizer only calls it when a
/// resolution rule actually needs the source dimensions or format.
#[async_trait]
pub trait OriginalAttributeSource: Send + Sync {
    /// Attributes of the original variant at `path`. `entry_id` of `None`
    /// means the most recent ready asset.
    async fn original_attributes(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
    ) -> Result<VariantAttributes, AssetError>;
}

/// Turns partially-specified client requests into fully-resolved
/// [`Transformation`] values.
///
/// The original-attribute fetch is lazy: it happens at most once per call,
/// and not at all when every rule can be resolved from the request alone.
pub struct TransformationNormalizer<S> {
    source: S,
}

impl<S: OriginalAttributeSource> TransformationNormalizer<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Normalize a single request against the asset at `path`/`entry_id`.
    pub async fn normalize(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
        requested: &TransformationRequest,
    ) -> Result<Transformation, AssetError> {
        requested.validate()?;

        if requested.original_variant {
            return Ok(Transformation::ORIGINAL);
        }

        let original = if needs_original(requested) {
            Some(self.source.original_attributes(path, entry_id).await?)
        } else {
            None
        };

        resolve(requested, original.as_ref())
    }

    /// Normalize a batch of requests against one asset with a single shared
    /// lazy fetch.
    pub async fn normalize_many(
        &self,
        path: &AssetPath,
        entry_id: Option<i64>,
        requests: &[TransformationRequest],
    ) -> Result<Vec<Transformation>, AssetError> {
        for request in requests {
            request.validate()?;
        }

        let original = if requests
            .iter()
            .any(|r| !r.original_variant && needs_original(r))
        {
            Some(self.source.original_attributes(path, entry_id).await?)
        } else {
            None
        };

        requests
            .iter()
            .map(|request| {
                if request.original_variant {
                    Ok(Transformation::ORIGINAL)
                } else {
                    resolve(request, original.as_ref())
                }
            })
            .collect()
    }
}

/// Bulk form for callers that already hold the original's attributes, e.g.
/// eager generation right after ingestion. Never fetches.
pub fn normalize_all(
    requests: &[TransformationRequest],
    original: &VariantAttributes,
) -> Result<Vec<Transformation>, AssetError> {
    requests
        .iter()
        .map(|request| {
            request.validate()?;
            if request.original_variant {
                Ok(Transformation::ORIGINAL)
            } else {
                resolve(request, Some(original))
            }
        })
        .collect()
}

/// Whether any resolution rule for this request needs the stored original.
fn needs_original(requested: &TransformationRequest) -> bool {
    if requested.format.is_none() {
        return true;
    }
    requested.fit_mode() == FitMode::Fit
        && (requested.width.is_none() || requested.height.is_none())
}

fn require_original<'a>(
    original: Option<&'a VariantAttributes>,
) -> Result<&'a VariantAttributes, AssetError> {
    original.ok_or_else(|| {
        AssetError::transient("original attributes were required but not resolved")
    })
}

/// A stored original with a zero dimension is corrupt; refuse to derive
/// anything from it.
fn require_dimensions(source: &VariantAttributes) -> Result<(), AssetError> {
    if source.width == 0 || source.height == 0 {
        return Err(AssetError::transient(format!(
            "stored original reports invalid dimensions {}x{}",
            source.width, source.height
        )));
    }
    Ok(())
}

/// Apply the resolution rules in specified order. `original` must be present
/// iff [`needs_original`] said so.
fn resolve(
    requested: &TransformationRequest,
    original: Option<&VariantAttributes>,
) -> Result<Transformation, AssetError> {
    let fit = requested.fit_mode();

    let (width, height) = match fit {
        FitMode::Fit => match (requested.width, requested.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => {
                let source = require_original(original)?;
                require_dimensions(source)?;
                let derived =
                    (source.height as f64 * w as f64 / source.width as f64).round() as u32;
                (w, derived.max(1))
            }
            (None, Some(h)) => {
                let source = require_original(original)?;
                require_dimensions(source)?;
                let derived =
                    (source.width as f64 * h as f64 / source.height as f64).round() as u32;
                (derived.max(1), h)
            }
            (None, None) => {
                let source = require_original(original)?;
                require_dimensions(source)?;
                (source.width, source.height)
            }
        },
        // validate() already guaranteed both are present.
        _ => match (requested.width, requested.height) {
            (Some(w), Some(h)) => (w, h),
            _ => {
                return Err(AssetError::validation(format!(
                    "fit mode '{fit}' requires both width and height"
                )));
            }
        },
    };

    let (rotate, horizontal_flip) = canonical_orientation(
        requested.rotate.unwrap_or(Rotation::Zero),
        requested.flip.unwrap_or(Flip::None),
    );

    let format = match requested.format {
        Some(format) => format,
        None => require_original(original)?.format,
    };

    let quality = if format.supports_quality() {
        requested.quality.unwrap_or_else(|| format.default_quality())
    } else {
        format.default_quality()
    };

    let pad = requested.pad.unwrap_or(0);
    let background = if pad == 0 {
        // No padding state at all; downstream reads empty as "skip padding".
        Vec::new()
    } else {
        match &requested.background {
            Some(raw) => parse_background(raw)?,
            None if format.supports_alpha() => vec![0, 0, 0, 0],
            None => vec![255, 255, 255, 255],
        }
    };

    Ok(Transformation {
        width,
        height,
        format,
        fit,
        gravity: requested.gravity.unwrap_or(super::Gravity::Center),
        rotate,
        horizontal_flip,
        filter: requested.filter.unwrap_or(super::Filter::None),
        blur: requested.blur.unwrap_or(0),
        quality,
        pad,
        background,
        can_upscale: requested.can_upscale.unwrap_or(false),
        original_variant: false,
    })
}
