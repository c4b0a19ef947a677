mod key;
mod normalize;
mod request;

pub use key::TransformationKey;
pub use normalize::{OriginalAttributeSource, TransformationNormalizer, normalize_all};
pub use request::TransformationRequest;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AssetError;

/// Inclusive upper bound for the blur parameter.
pub const MAX_BLUR: u8 = 150;
/// Inclusive upper bound for the pad parameter, in pixels per edge.
pub const MAX_PAD: u32 = 500;

/// Stored/rendered image formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Gif,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Gif => "gif",
        }
    }

    /// Whether the format has a meaningful quality knob. Lossless formats
    /// ignore any requested quality and use their fixed default instead.
    pub fn supports_quality(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Webp | Self::Avif)
    }

    pub fn supports_alpha(&self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    pub fn default_quality(&self) -> u8 {
        match self {
            Self::Jpeg => 85,
            Self::Webp => 80,
            Self::Avif => 60,
            Self::Png | Self::Gif => 100,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            "gif" => Ok(Self::Gif),
            _ => Err(AssetError::validation(format!("unknown image format '{s}'"))),
        }
    }
}

/// How requested dimensions map onto the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Aspect-preserving scale inside the requested box.
    Fit,
    /// Scale to cover the box, cropping overflow toward the gravity.
    Fill,
    /// Scale to the box exactly, distorting aspect ratio.
    Stretch,
    /// Cut the box out of the source without scaling.
    Crop,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Stretch => "stretch",
            Self::Crop => "crop",
        }
    }

    /// FILL/STRETCH/CROP cannot derive a missing dimension from the source.
    pub fn requires_both_dimensions(&self) -> bool {
        !matches!(self, Self::Fit)
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchor for crop/fill overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gravity {
    Center,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Gravity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::North => "north",
            Self::NorthEast => "north-east",
            Self::East => "east",
            Self::SouthEast => "south-east",
            Self::South => "south",
            Self::SouthWest => "south-west",
            Self::West => "west",
            Self::NorthWest => "north-west",
        }
    }
}

/// Quarter-turn clockwise rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    Zero,
    Ninety,
    OneEighty,
    TwoSeventy,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Self::Zero => 0,
            Self::Ninety => 90,
            Self::OneEighty => 180,
            Self::TwoSeventy => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Result<Self, AssetError> {
        match degrees % 360 {
            0 => Ok(Self::Zero),
            90 => Ok(Self::Ninety),
            180 => Ok(Self::OneEighty),
            270 => Ok(Self::TwoSeventy),
            _ => Err(AssetError::validation(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            ))),
        }
    }

    /// Compose two rotations.
    pub fn plus(&self, other: Rotation) -> Rotation {
        // Safe: sum of two multiples of 90 stays a multiple of 90.
        Self::from_degrees(self.degrees() + other.degrees()).unwrap()
    }
}

/// Mirror request parameter. Only the canonical form after normalization is
/// persisted, which uses horizontal flip exclusively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flip {
    None,
    Horizontal,
    Vertical,
}

/// Collapse a (rotate, flip) pair into the canonical (rotate, horizontal_flip)
/// form. A vertical flip is the same visual transform as a horizontal flip
/// followed by an extra half turn.
pub fn canonical_orientation(rotate: Rotation, flip: Flip) -> (Rotation, bool) {
    match flip {
        Flip::None => (rotate, false),
        Flip::Horizontal => (rotate, true),
        Flip::Vertical => (rotate.plus(Rotation::OneEighty), true),
    }
}

/// Post-scale color filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    None,
    Grayscale,
    Sepia,
}

impl Filter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
        }
    }
}

/// Parse a `#RRGGBB` or `#RRGGBBAA` background color into RGBA components.
pub fn parse_background(raw: &str) -> Result<Vec<u8>, AssetError> {
    let hex_part = raw.strip_prefix('#').unwrap_or(raw);
    if hex_part.len() != 6 && hex_part.len() != 8 {
        return Err(AssetError::validation(format!(
            "background must be #RRGGBB or #RRGGBBAA, got '{raw}'"
        )));
    }

    let mut rgba = hex::decode(hex_part)
        .map_err(|_| AssetError::validation(format!("malformed background hex '{raw}'")))?;
    if rgba.len() == 3 {
        rgba.push(0xff);
    }
    Ok(rgba)
}

/// A fully-normalized set of rendering parameters.
///
/// Every field is concrete; only [`TransformationNormalizer`] may produce one
/// from a partially-specified [`TransformationRequest`]. The
/// [`Transformation::ORIGINAL`] sentinel means "return the source bytes as
/// stored" and carries no meaningful parameter values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub fit: FitMode,
    pub gravity: Gravity,
    pub rotate: Rotation,
    pub horizontal_flip: bool,
    pub filter: Filter,
    /// 0 = no blur.
    pub blur: u8,
    pub quality: u8,
    /// Padding in pixels per edge, 0 = none.
    pub pad: u32,
    /// RGBA padding color; empty means no padding state at all.
    pub background: Vec<u8>,
    pub can_upscale: bool,
    pub original_variant: bool,
}

impl Transformation {
    /// Sentinel for "no transformation, serve the stored original".
    pub const ORIGINAL: Transformation = Transformation {
        width: 0,
        height: 0,
        format: ImageFormat::Png,
        fit: FitMode::Fit,
        gravity: Gravity::Center,
        rotate: Rotation::Zero,
        horizontal_flip: false,
        filter: Filter::None,
        blur: 0,
        quality: 0,
        pad: 0,
        background: Vec::new(),
        can_upscale: false,
        original_variant: true,
    };

    pub fn is_original(&self) -> bool {
        self.original_variant
    }

    /// Canonical dedup/lookup key for this transformation.
    pub fn key(&self) -> TransformationKey {
        TransformationKey::compute(self)
    }
}
