use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Tracker;
use crate::db::{PeerStatsDelta, Store, TorrentStatsDelta, UserStatsDelta};
use crate::metrics::collector::Metrics;
use crate::proto::ids::{InfoHash, Passkey, PeerHash};

/// Accumulates per-user, per-torrent and per-peer stat deltas between batch
/// ticks.
///
/// The announce path merges into one of three keyed maps under a short
/// mutex; each tick swaps a map out whole (`mem::take`) so announces never
/// wait on a store write. If a store call fails the drained deltas are
/// merged back and retried next tick, so no counts are lost.
pub struct BatchWriter {
    users: Mutex<HashMap<Passkey, UserStatsDelta>>,
    torrents: Mutex<HashMap<InfoHash, TorrentStatsDelta>>,
    peers: Mutex<HashMap<PeerHash, PeerStatsDelta>>,
}

impl BatchWriter {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            torrents: Mutex::new(HashMap::new()),
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn queue_user(&self, delta: UserStatsDelta) {
        let mut users = self.users.lock().expect("batch lock poisoned");
        match users.entry(delta.passkey) {
            Entry::Occupied(mut entry) => {
                let acc = entry.get_mut();
                acc.uploaded += delta.uploaded;
                acc.downloaded += delta.downloaded;
                acc.announces += delta.announces;
            }
            Entry::Vacant(entry) => {
                entry.insert(delta);
            }
        }
    }

    pub fn queue_torrent(&self, delta: TorrentStatsDelta) {
        let mut torrents = self.torrents.lock().expect("batch lock poisoned");
        match torrents.entry(delta.info_hash) {
            Entry::Occupied(mut entry) => {
                let acc = entry.get_mut();
                acc.uploaded += delta.uploaded;
                acc.downloaded += delta.downloaded;
                acc.announces += delta.announces;
                acc.snatches += delta.snatches;
                acc.seeders = delta.seeders;
                acc.leechers = delta.leechers;
            }
            Entry::Vacant(entry) => {
                entry.insert(delta);
            }
        }
    }

    pub fn queue_peer(&self, delta: PeerStatsDelta) {
        let mut peers = self.peers.lock().expect("batch lock poisoned");
        match peers.entry(delta.peer_hash) {
            Entry::Occupied(mut entry) => {
                let acc = entry.get_mut();
                acc.uploaded += delta.uploaded;
                acc.downloaded += delta.downloaded;
                acc.announces += delta.announces;
                acc.left = delta.left;
                acc.announce_last = delta.announce_last;
                acc.total_time = delta.total_time;
                acc.speed_up = delta.speed_up;
                acc.speed_dn = delta.speed_dn;
                acc.speed_up_max = delta.speed_up_max;
                acc.speed_dn_max = delta.speed_dn_max;
                acc.paused = delta.paused;
            }
            Entry::Vacant(entry) => {
                entry.insert(delta);
            }
        }
    }

    /// Pending (users, torrents, peers) entry counts.
    pub fn pending(&self) -> (usize, usize, usize) {
        (
            self.users.lock().expect("batch lock poisoned").len(),
            self.torrents.lock().expect("batch lock poisoned").len(),
            self.peers.lock().expect("batch lock poisoned").len(),
        )
    }

    /// Drain all three accumulators into the store. Returns false when any
    /// store call failed; the affected deltas are already merged back.
    pub async fn flush(&self, store: &dyn Store, metrics: &Metrics) -> bool {
        let users = std::mem::take(&mut *self.users.lock().expect("batch lock poisoned"));
        let torrents = std::mem::take(&mut *self.torrents.lock().expect("batch lock poisoned"));
        let peers = std::mem::take(&mut *self.peers.lock().expect("batch lock poisoned"));

        if users.is_empty() && torrents.is_empty() && peers.is_empty() {
            return true;
        }

        debug!(
            users = users.len(),
            torrents = torrents.len(),
            peers = peers.len(),
            "Flushing stat deltas"
        );

        let mut failed: Option<String> = None;

        if !users.is_empty() {
            if let Err(e) = store
                .user_update_stats(users.values().cloned().collect())
                .await
            {
                for delta in users.into_values() {
                    self.requeue_user(delta);
                }
                failed.get_or_insert(e.to_string());
            }
        }

        if !torrents.is_empty() {
            if let Err(e) = store
                .torrent_update_stats(torrents.values().cloned().collect())
                .await
            {
                for delta in torrents.into_values() {
                    self.requeue_torrent(delta);
                }
                failed.get_or_insert(e.to_string());
            }
        }

        if !peers.is_empty() {
            if let Err(e) = store
                .peer_update_stats(peers.values().cloned().collect())
                .await
            {
                for delta in peers.into_values() {
                    self.requeue_peer(delta);
                }
                failed.get_or_insert(e.to_string());
            }
        }

        // One log line per failed batch, not one per delta
        if let Some(error) = failed {
            metrics.record_store_write_error();
            warn!(error = %error, "Batch stat write failed; deltas kept for next tick");
            return false;
        }

        true
    }

    // Requeue variants add the additive fields but keep whatever newer
    // last-wins values arrived while the failed flush was in flight.

    fn requeue_user(&self, delta: UserStatsDelta) {
        self.queue_user(delta);
    }

    fn requeue_torrent(&self, delta: TorrentStatsDelta) {
        let mut torrents = self.torrents.lock().expect("batch lock poisoned");
        match torrents.entry(delta.info_hash) {
            Entry::Occupied(mut entry) => {
                let acc = entry.get_mut();
                acc.uploaded += delta.uploaded;
                acc.downloaded += delta.downloaded;
                acc.announces += delta.announces;
                acc.snatches += delta.snatches;
            }
            Entry::Vacant(entry) => {
                entry.insert(delta);
            }
        }
    }

    fn requeue_peer(&self, delta: PeerStatsDelta) {
        let mut peers = self.peers.lock().expect("batch lock poisoned");
        match peers.entry(delta.peer_hash) {
            Entry::Occupied(mut entry) => {
                let acc = entry.get_mut();
                acc.uploaded += delta.uploaded;
                acc.downloaded += delta.downloaded;
                acc.announces += delta.announces;
            }
            Entry::Vacant(entry) => {
                entry.insert(delta);
            }
        }
    }
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic batch task. Ticks at the configured interval and drains one
/// final batch on shutdown so committed announces reach the store.
pub async fn run(tracker: Arc<Tracker>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let interval = tracker
            .settings
            .batch_update_interval
            .load(Ordering::Relaxed);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(u64::from(interval))) => {
                tracker.flush_stats().await;
            }
            _ = shutdown.changed() => {
                tracker.flush_stats().await;
                info!("Batch writer drained final batch and stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::{StoreError, StoreResult};
    use crate::models::user::User;
    use async_trait::async_trait;

    fn passkey() -> Passkey {
        Passkey::parse("aaaaaaaaaaaaaaaaaaaa").unwrap()
    }

    fn info_hash() -> InfoHash {
        InfoHash::from_bytes(&[3u8; 20]).unwrap()
    }

    fn user_delta(uploaded: u64) -> UserStatsDelta {
        UserStatsDelta {
            passkey: passkey(),
            uploaded,
            downloaded: 0,
            announces: 1,
        }
    }

    fn torrent_delta(uploaded: u64, seeders: i32) -> TorrentStatsDelta {
        TorrentStatsDelta {
            info_hash: info_hash(),
            uploaded,
            downloaded: 0,
            announces: 1,
            snatches: 0,
            seeders,
            leechers: 0,
        }
    }

    #[test]
    fn test_deltas_merge_by_key() {
        let batch = BatchWriter::new();
        batch.queue_user(user_delta(100));
        batch.queue_user(user_delta(50));
        batch.queue_torrent(torrent_delta(100, 1));
        batch.queue_torrent(torrent_delta(25, 2));

        assert_eq!(batch.pending(), (1, 1, 0));

        let users = batch.users.lock().unwrap();
        let acc = users.get(&passkey()).unwrap();
        assert_eq!(acc.uploaded, 150);
        assert_eq!(acc.announces, 2);
        drop(users);

        let torrents = batch.torrents.lock().unwrap();
        let acc = torrents.get(&info_hash()).unwrap();
        assert_eq!(acc.uploaded, 125);
        // Last-wins for the non-additive counts
        assert_eq!(acc.seeders, 2);
    }

    #[tokio::test]
    async fn test_flush_applies_and_clears() {
        let store = MemoryStore::new();
        store.user_add(User::new(1, passkey())).await.unwrap();
        let metrics = Metrics::new();

        let batch = BatchWriter::new();
        batch.queue_user(user_delta(100));

        assert!(batch.flush(&store, &metrics).await);
        assert_eq!(batch.pending(), (0, 0, 0));

        let user = store.user_by_passkey(&passkey()).await.unwrap();
        assert_eq!(user.uploaded, 100);
        assert_eq!(user.announces, 1);
    }

    /// Store that refuses every write.
    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn user_by_passkey(&self, _: &Passkey) -> StoreResult<User> {
            Err(StoreError::NotFound)
        }
        async fn user_add(&self, _: User) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn user_update(&self, _: &Passkey, _: User) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn user_delete(&self, _: &Passkey) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn user_update_stats(&self, _: Vec<UserStatsDelta>) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn torrent_by_info_hash(
            &self,
            _: &InfoHash,
            _: bool,
        ) -> StoreResult<crate::models::torrent::Torrent> {
            Err(StoreError::NotFound)
        }
        async fn torrent_add(&self, _: crate::models::torrent::Torrent) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn torrent_update(&self, _: crate::models::torrent::Torrent) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn torrent_delete(&self, _: &InfoHash) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn torrent_update_stats(&self, _: Vec<TorrentStatsDelta>) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn peer_add(
            &self,
            _: &InfoHash,
            _: crate::models::peer::Peer,
        ) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn peer_delete(
            &self,
            _: &InfoHash,
            _: &crate::proto::ids::PeerID,
        ) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn peer_reap(&self, _: i64) -> StoreResult<u64> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn peer_update_stats(&self, _: Vec<PeerStatsDelta>) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn whitelist_get_all(
            &self,
        ) -> StoreResult<Vec<crate::models::whitelist::WhiteListClient>> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn whitelist_add(
            &self,
            _: crate::models::whitelist::WhiteListClient,
        ) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
        async fn whitelist_delete(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::Backend(anyhow::anyhow!("down")))
        }
    }

    #[tokio::test]
    async fn test_failed_flush_merges_deltas_back() {
        let metrics = Metrics::new();
        let batch = BatchWriter::new();
        batch.queue_user(user_delta(100));
        batch.queue_torrent(torrent_delta(40, 1));

        assert!(!batch.flush(&FailingStore, &metrics).await);
        // Nothing lost
        assert_eq!(batch.pending(), (1, 1, 0));
        assert_eq!(metrics.snapshot(0, 0, 0).store_write_errors, 1);

        // A later successful flush applies the merged total
        let store = MemoryStore::new();
        store.user_add(User::new(1, passkey())).await.unwrap();
        batch.queue_user(user_delta(11));
        assert!(batch.flush(&store, &metrics).await);
        let user = store.user_by_passkey(&passkey()).await.unwrap();
        assert_eq!(user.uploaded, 111);
    }

    #[tokio::test]
    async fn test_requeue_keeps_newer_last_wins_fields() {
        let batch = BatchWriter::new();

        // A newer delta arrives after the failed drain took the old one
        batch.queue_torrent(torrent_delta(10, 5));
        let drained = std::mem::take(&mut *batch.torrents.lock().unwrap());
        batch.queue_torrent(torrent_delta(3, 7));

        for delta in drained.into_values() {
            batch.requeue_torrent(delta);
        }

        let torrents = batch.torrents.lock().unwrap();
        let acc = torrents.get(&info_hash()).unwrap();
        assert_eq!(acc.uploaded, 13);
        // The fresher seeder count wins over the requeued one
        assert_eq!(acc.seeders, 7);
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let store = MemoryStore::new();
        let metrics = Metrics::new();
        let batch = BatchWriter::new();
        assert!(batch.flush(&store, &metrics).await);
    }
}
