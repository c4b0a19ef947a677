//! Periodic reconciliation of state stuck in a non-terminal phase.
//!
//! The asset and variant sweepers delete rows that never left `Pending`,
//! writing reap events for any bytes already persisted; the reaper consumes
//! those events and physically deletes the objects. All three are idempotent
//! under re-invocation and only touch rows stale past a threshold, so they
//! never race an in-flight legitimate write.

mod failed_assets;
mod failed_variants;
mod reaper;

pub use failed_assets::{run_failed_asset_sweeper, sweep_failed_assets};
pub use failed_variants::{run_failed_variant_sweeper, sweep_failed_variants};
pub use reaper::{reap_outbox_events, run_variant_reaper};
