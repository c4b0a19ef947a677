use std::sync::Arc;
use std::time::Duration;

use common::config::SweepSettings;
use common::storage::{ObjectLocation, ObjectStore};
use sea_orm::DatabaseConnection;
use tracing::{debug, error, info, warn};

use crate::outbox::{OutboxService, ReapVariantPayload};

/// Run the variant reaper as a background task.
pub async fn run_variant_reaper(
    db: DatabaseConnection,
    store: Arc<dyn ObjectStore>,
    config: SweepSettings,
) {
    let scan_interval = Duration::from_secs(config.scan_interval_secs);

    info!(
        scan_interval_secs = config.scan_interval_secs,
        batch_size = config.reap_batch_size,
        "Starting variant reaper"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = reap_outbox_events(&db, store.as_ref(), config.reap_batch_size).await {
            error!(error = %e, "Variant reap pass failed");
        }
    }
}

/// Consume one batch of reap events: delete the bytes, then the event row.
///
/// At-least-once: the event row is removed only after the delete succeeds,
/// so a crash in between just retries a delete the store already tolerates.
/// A failing delete leaves its row for the next pass and never aborts the
/// batch. Returns the number of events consumed.
pub async fn reap_outbox_events(
    db: &DatabaseConnection,
    store: &dyn ObjectStore,
    batch_size: u64,
) -> anyhow::Result<usize> {
    let outbox = OutboxService::new(db);
    let events = outbox.next_reap_batch(batch_size).await?;

    if events.is_empty() {
        return Ok(0);
    }

    debug!(count = events.len(), "Reaping variant objects");

    let mut reaped = 0;
    for event in events {
        let payload: ReapVariantPayload = match serde_json::from_value(event.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                error!(event_id = event.id, error = %e, "Unreadable reap payload, skipping");
                outbox.record_failure(&event).await?;
                continue;
            }
        };
        let location = ObjectLocation::from(payload);

        match store.delete(&location.bucket, &location.key).await {
            Ok(()) => {
                outbox.delete(event.id).await?;
                reaped += 1;
                debug!(event_id = event.id, %location, "Reaped variant object");
            }
            Err(e) => {
                warn!(event_id = event.id, %location, error = %e, "Reap failed, will retry");
                outbox.record_failure(&event).await?;
            }
        }
    }

    Ok(reaped)
}
