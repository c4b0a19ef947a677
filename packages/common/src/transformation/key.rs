use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AssetError;

use super::Transformation;

/// Canonical dedup/lookup key of a transformation.
///
/// Two transformations with equal logical field values always produce the
/// same key regardless of how they were constructed; distinct logical
/// transformations produce distinct keys with overwhelming probability
/// (SHA-256 over the canonical field tuple). The hex form is the value the
/// repository's uniqueness constraint is enforced on.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformationKey([u8; 32]);

impl TransformationKey {
    /// Compute the key for a transformation.
    pub fn compute(transformation: &Transformation) -> Self {
        Self(Sha256::digest(canonical_form(transformation)).into())
    }

    /// The distinguished key of the untransformed original variant.
    pub fn original() -> Self {
        Self::compute(&Transformation::ORIGINAL)
    }

    /// Parse a hex-encoded key string.
    pub fn from_hex(s: &str) -> Result<Self, AssetError> {
        if s.len() != 64 {
            return Err(AssetError::validation(format!(
                "transformation key must be 64 hex characters, got {}",
                s.len()
            )));
        }

        let bytes = hex::decode(s)
            .map_err(|e| AssetError::validation(format!("invalid transformation key hex: {e}")))?;

        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AssetError::validation("transformation key decoded to wrong length"))?;

        Ok(Self(arr))
    }

    /// Return the key as a 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Deterministic byte encoding of the identity-relevant fields.
///
/// The tuple covers exactly the fields that define "the same variant":
/// width, height, format, fit, rotate, horizontal flip, filter, gravity,
/// quality, pad, background, blur. `can_upscale` influences processing of a
/// request but not the identity of the result, so it is excluded.
fn canonical_form(t: &Transformation) -> Vec<u8> {
    if t.is_original() {
        return b"original".to_vec();
    }

    format!(
        "w={};h={};fmt={};fit={};rot={};hflip={};filter={};grav={};q={};pad={};bg={};blur={}",
        t.width,
        t.height,
        t.format.as_str(),
        t.fit.as_str(),
        t.rotate.degrees(),
        t.horizontal_flip,
        t.filter.as_str(),
        t.gravity.as_str(),
        t.quality,
        t.pad,
        hex::encode(&t.background),
        t.blur,
    )
    .into_bytes()
}

impl fmt::Debug for TransformationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformationKey({})", self.to_hex())
    }
}

impl fmt::Display for TransformationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for TransformationKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TransformationKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
