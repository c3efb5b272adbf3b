use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Tracker;
use crate::db::TorrentStatsDelta;
use crate::utils::time::current_timestamp;

/// Periodic peer expiry. Every tick sweeps the swarm index, evicting peers
/// that have not announced within the TTL (two announce intervals) and
/// queueing the corrected seeder/leecher counts for the batch writer. The
/// sweep yields between swarms, so announce latency is bounded by one
/// swarm's lock span, not the whole index.
pub async fn run(tracker: Arc<Tracker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let interval = tracker.settings.reaper_interval.load(Ordering::Relaxed);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(u64::from(interval))) => {
                sweep(&tracker).await;
            }
            _ = shutdown.changed() => {
                info!("Reaper stopped");
                break;
            }
        }
    }
}

pub async fn sweep(tracker: &Tracker) {
    let now = current_timestamp();
    let ttl = tracker.settings.peer_ttl();

    let batch = &tracker.batch;
    let evicted = tracker
        .swarms
        .reap(now, ttl, |info_hash, _evicted, seeders, leechers| {
            batch.queue_torrent(TorrentStatsDelta {
                info_hash,
                uploaded: 0,
                downloaded: 0,
                announces: 0,
                snatches: 0,
                seeders,
                leechers,
            });
        })
        .await;

    if evicted > 0 {
        // Stale rows in the store go in one ranged delete
        if let Err(e) = tracker.store.peer_reap(now - ttl).await {
            warn!(error = %e, "Store peer reap failed");
        }

        info!(
            evicted,
            active_peers = tracker.swarms.peer_count(),
            swarms = tracker.swarms.len(),
            "Reaper sweep completed"
        );
    } else {
        debug!("Reaper sweep completed, no stale peers");
    }
}
