//! Periodic tombstone GC: idempotent, deletes expired rows.

use std::sync::Arc;
use std::time::Duration;
use sync_storage::TombstoneJanitor;
use tracing::{info, warn};

pub async fn run_forever(janitor: Arc<TombstoneJanitor>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match janitor.sweep().await {
            Ok(count) if count > 0 => info!(count, "swept expired tombstones"),
            Ok(_) => {}
            Err(err) => warn!(%err, "tombstone sweep failed"),
        }
    }
}
