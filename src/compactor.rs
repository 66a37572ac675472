use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::repository::WalRoomRepository;

pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the room WAL once `threshold` appends have
/// piled up since the last compaction.
pub async fn run_compactor(repo: Arc<WalRoomRepository>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_due(&repo, threshold).await;
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_due(repo: &WalRoomRepository, threshold: u64) -> bool {
    let appends = repo.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match repo.compact().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}
