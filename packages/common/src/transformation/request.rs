use serde::{Deserialize, Serialize};

use crate::error::AssetError;

use super::{Filter, FitMode, Flip, Gravity, ImageFormat, MAX_BLUR, MAX_PAD, Rotation};

/// A partially-specified transformation as received from a client, before
/// normalization fills in the gaps.
///
/// `None` means "not requested, use the default resolution rule". The request
/// itself never touches the repository; range checks here are the cheap
/// validations that must fail before any original-attribute lookup happens.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<ImageFormat>,
    pub fit: Option<FitMode>,
    pub gravity: Option<Gravity>,
    pub rotate: Option<Rotation>,
    pub flip: Option<Flip>,
    pub filter: Option<Filter>,
    pub blur: Option<u8>,
    pub quality: Option<u8>,
    pub pad: Option<u32>,
    /// `#RRGGBB` / `#RRGGBBAA` padding color.
    pub background: Option<String>,
    pub can_upscale: Option<bool>,
    /// Request the stored original instead of a derived variant.
    #[serde(default)]
    pub original_variant: bool,
}

impl TransformationRequest {
    /// Shorthand for requesting the untransformed original.
    pub fn original() -> Self {
        Self {
            original_variant: true,
            ..Self::default()
        }
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit.unwrap_or(FitMode::Fit)
    }

    /// Check parameter ranges and per-fit-mode requirements. Runs before any
    /// lookup; a request that fails here never reaches the repository.
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.original_variant {
            return Ok(());
        }

        if let Some(width) = self.width
            && width == 0
        {
            return Err(AssetError::validation("width must be positive"));
        }
        if let Some(height) = self.height
            && height == 0
        {
            return Err(AssetError::validation("height must be positive"));
        }

        let fit = self.fit_mode();
        if fit.requires_both_dimensions() && (self.width.is_none() || self.height.is_none()) {
            return Err(AssetError::validation(format!(
                "fit mode '{fit}' requires both width and height"
            )));
        }

        if let Some(blur) = self.blur
            && blur > MAX_BLUR
        {
            return Err(AssetError::validation(format!(
                "blur must be in 0..={MAX_BLUR}, got {blur}"
            )));
        }

        if let Some(quality) = self.quality
            && !(1..=100).contains(&quality)
        {
            return Err(AssetError::validation(format!(
                "quality must be in 1..=100, got {quality}"
            )));
        }

        if let Some(pad) = self.pad
            && pad > MAX_PAD
        {
            return Err(AssetError::validation(format!(
                "pad must be in 0..={MAX_PAD}, got {pad}"
            )));
        }

        Ok(())
    }
}
