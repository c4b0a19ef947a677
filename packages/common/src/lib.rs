pub mod attributes;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod path;
pub mod pipeline;
pub mod storage;
pub mod transformation;

pub use attributes::{LqipKind, LqipPayload, VariantAttributes};
pub use error::AssetError;
pub use lifecycle::{AssetSource, LifecycleState};
pub use path::AssetPath;
pub use transformation::{Transformation, TransformationKey, TransformationRequest};
