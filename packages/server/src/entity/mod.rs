pub mod asset;
pub mod asset_variant;
pub mod outbox_event;
