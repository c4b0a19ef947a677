use common::attributes::{LqipKind, LqipPayload, VariantAttributes};
use common::pipeline::PreprocessSettings;
use common::storage::ObjectLocation;
use common::transformation::Transformation;
use common::{AssetError, AssetPath};
use tokio::sync::oneshot;

use crate::entity::asset_variant;

/// Result of first-time ingestion: where the normalized bytes landed and
/// what they look like.
#[derive(Debug)]
pub struct PreProcessOutcome {
    pub location: ObjectLocation,
    pub attributes: VariantAttributes,
    pub lqip: Option<LqipPayload>,
}

/// A schedulable unit of work. In-memory only; a job lives from submission
/// until its reply channel is resolved or dropped.
pub enum Job {
    /// First-time ingestion: normalize the source bytes, compute optional
    /// placeholders, and persist the result to the output bucket.
    PreProcess {
        source: Vec<u8>,
        settings: PreprocessSettings,
        lqip: Vec<LqipKind>,
        bucket: String,
        reply: oneshot::Sender<Result<PreProcessOutcome, AssetError>>,
    },
    /// Interactive single-variant generation; the submitting caller is
    /// suspended on the reply.
    OnDemand {
        path: AssetPath,
        entry_id: Option<i64>,
        transformation: Transformation,
        reply: oneshot::Sender<Result<asset_variant::Model, AssetError>>,
    },
    /// Background multi-variant generation; the reply is optional because
    /// eager submitters usually fire and forget.
    Eager {
        path: AssetPath,
        entry_id: Option<i64>,
        transformations: Vec<Transformation>,
        reply: Option<oneshot::Sender<Result<Vec<asset_variant::Model>, AssetError>>>,
    },
}

impl Job {
    pub fn pre_process(
        source: Vec<u8>,
        settings: PreprocessSettings,
        lqip: Vec<LqipKind>,
        bucket: String,
    ) -> (Self, oneshot::Receiver<Result<PreProcessOutcome, AssetError>>) {
        let (reply, rx) = oneshot::channel();
        (
            Self::PreProcess {
                source,
                settings,
                lqip,
                bucket,
                reply,
            },
            rx,
        )
    }

    pub fn on_demand(
        path: AssetPath,
        entry_id: Option<i64>,
        transformation: Transformation,
    ) -> (
        Self,
        oneshot::Receiver<Result<asset_variant::Model, AssetError>>,
    ) {
        let (reply, rx) = oneshot::channel();
        (
            Self::OnDemand {
                path,
                entry_id,
                transformation,
                reply,
            },
            rx,
        )
    }

    pub fn eager(
        path: AssetPath,
        entry_id: Option<i64>,
        transformations: Vec<Transformation>,
    ) -> Self {
        Self::Eager {
            path,
            entry_id,
            transformations,
            reply: None,
        }
    }

    pub fn eager_with_reply(
        path: AssetPath,
        entry_id: Option<i64>,
        transformations: Vec<Transformation>,
    ) -> (
        Self,
        oneshot::Receiver<Result<Vec<asset_variant::Model>, AssetError>>,
    ) {
        let (reply, rx) = oneshot::channel();
        (
            Self::Eager {
                path,
                entry_id,
                transformations,
                reply: Some(reply),
            },
            rx,
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PreProcess { .. } => "pre_process",
            Self::OnDemand { .. } => "on_demand",
            Self::Eager { .. } => "eager",
        }
    }
}
