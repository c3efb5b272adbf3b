use dashmap::DashMap;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::db::{Store, StoreError, StoreResult};
use crate::models::peer::Peer;
use crate::models::torrent::Torrent;
use crate::proto::ids::{InfoHash, PeerID};
use crate::proto::response::PeerEndpoint;
use crate::utils::time::is_expired;

/// One torrent's live swarm: its metadata plus the peer set.
///
/// The peer map and the torrent meta each sit behind their own lock; when
/// both are needed the peer lock is always taken first. One announce holds
/// the peer write lock for the duration of its state update, which is what
/// serializes announces per (info_hash, peer_id).
pub struct Swarm {
    torrent: RwLock<Torrent>,
    peers: RwLock<HashMap<PeerID, Peer>>,
    /// Rotation cursor for fair peer selection.
    cursor: AtomicUsize,
}

/// Outcome of folding one announce into a swarm.
#[derive(Debug, Clone, Copy)]
pub struct PeerUpsert {
    pub created: bool,
    pub was_seeder: bool,
    pub is_seeder: bool,
    pub ul_delta: u64,
    pub dl_delta: u64,
}

impl Swarm {
    fn new(mut torrent: Torrent) -> Self {
        // In-memory counts restart from the live peer set, not stored values
        torrent.seeders = 0;
        torrent.leechers = 0;
        Self {
            torrent: RwLock::new(torrent),
            peers: RwLock::new(HashMap::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn torrent(&self) -> Torrent {
        self.torrent.read().expect("torrent lock poisoned").clone()
    }

    pub fn with_torrent_mut<R>(&self, f: impl FnOnce(&mut Torrent) -> R) -> R {
        let mut torrent = self.torrent.write().expect("torrent lock poisoned");
        f(&mut torrent)
    }

    pub fn peer(&self, peer_id: &PeerID) -> Option<Peer> {
        self.peers
            .read()
            .expect("peer lock poisoned")
            .get(peer_id)
            .cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().expect("peer lock poisoned").len()
    }

    /// Current (seeders, leechers).
    pub fn counts(&self) -> (i32, i32) {
        let torrent = self.torrent.read().expect("torrent lock poisoned");
        (torrent.seeders, torrent.leechers)
    }

    /// Insert or update one peer under the swarm write lock. `create` builds
    /// the default peer for a first announce, `update` folds the announce in
    /// (returning byte deltas); seeder/leecher counts are adjusted here so
    /// they always equal the partition of the live peer set.
    pub fn upsert_peer(
        &self,
        peer_id: PeerID,
        create: impl FnOnce() -> Peer,
        update: impl FnOnce(&mut Peer) -> (u64, u64),
    ) -> PeerUpsert {
        let mut peers = self.peers.write().expect("peer lock poisoned");

        match peers.entry(peer_id) {
            Entry::Occupied(mut entry) => {
                let was_seeder = entry.get().is_seeder();
                let (ul_delta, dl_delta) = update(entry.get_mut());
                let is_seeder = entry.get().is_seeder();

                if was_seeder != is_seeder {
                    let mut torrent = self.torrent.write().expect("torrent lock poisoned");
                    if is_seeder {
                        torrent.leechers -= 1;
                        torrent.seeders += 1;
                    } else {
                        torrent.seeders -= 1;
                        torrent.leechers += 1;
                    }
                }

                PeerUpsert {
                    created: false,
                    was_seeder,
                    is_seeder,
                    ul_delta,
                    dl_delta,
                }
            }
            Entry::Vacant(entry) => {
                let mut peer = create();
                let (ul_delta, dl_delta) = update(&mut peer);
                let is_seeder = peer.is_seeder();
                entry.insert(peer);

                let mut torrent = self.torrent.write().expect("torrent lock poisoned");
                if is_seeder {
                    torrent.seeders += 1;
                } else {
                    torrent.leechers += 1;
                }

                PeerUpsert {
                    created: true,
                    was_seeder: false,
                    is_seeder,
                    ul_delta,
                    dl_delta,
                }
            }
        }
    }

    pub fn remove_peer(&self, peer_id: &PeerID) -> Option<Peer> {
        let mut peers = self.peers.write().expect("peer lock poisoned");
        let peer = peers.remove(peer_id)?;

        let mut torrent = self.torrent.write().expect("torrent lock poisoned");
        if peer.is_seeder() {
            torrent.seeders -= 1;
        } else {
            torrent.leechers -= 1;
        }

        Some(peer)
    }

    /// Pick up to `want` peers for a response.
    ///
    /// Skips the requester and port-0 entries; peers whose address family
    /// matches the client fill the list first. Selection rotates through the
    /// swarm with a per-swarm cursor so every peer gets handed out over
    /// successive announces; no capacity sort, no shuffle.
    pub fn select_peers(
        &self,
        want: usize,
        requester: &PeerID,
        client_v6: bool,
        ipv6_allowed: bool,
    ) -> Vec<PeerEndpoint> {
        if want == 0 {
            return Vec::new();
        }

        let peers = self.peers.read().expect("peer lock poisoned");

        let mut matching = Vec::new();
        let mut other = Vec::new();
        for peer in peers.values() {
            if peer.peer_id == *requester || peer.port == 0 {
                continue;
            }
            let v6 = peer.ip.is_ipv6();
            if v6 && !ipv6_allowed {
                continue;
            }
            let endpoint = PeerEndpoint {
                ip: peer.ip,
                port: peer.port,
            };
            if v6 == client_v6 {
                matching.push(endpoint);
            } else {
                other.push(endpoint);
            }
        }
        drop(peers);

        let offset = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut selected = Vec::with_capacity(want.min(matching.len() + other.len()));
        for pool in [matching, other] {
            if selected.len() >= want {
                break;
            }
            let len = pool.len();
            for i in 0..len {
                if selected.len() >= want {
                    break;
                }
                selected.push(pool[(offset + i) % len]);
            }
        }

        selected
    }

    /// Evict peers whose last announce is older than `ttl` seconds. Returns
    /// (evicted, seeders, leechers) with the counts after eviction.
    pub fn reap(&self, now: i64, ttl: i64) -> (usize, i32, i32) {
        let mut peers = self.peers.write().expect("peer lock poisoned");

        let mut evicted_seeders = 0;
        let mut evicted_leechers = 0;
        peers.retain(|_, peer| {
            if is_expired(peer.announce_last, ttl, now) {
                if peer.is_seeder() {
                    evicted_seeders += 1;
                } else {
                    evicted_leechers += 1;
                }
                false
            } else {
                true
            }
        });

        let mut torrent = self.torrent.write().expect("torrent lock poisoned");
        torrent.seeders -= evicted_seeders;
        torrent.leechers -= evicted_leechers;

        (
            (evicted_seeders + evicted_leechers) as usize,
            torrent.seeders,
            torrent.leechers,
        )
    }

}

/// The hot index mapping info hashes to live swarms.
///
/// The outer map is sharded (`DashMap`), so announces to known swarms only
/// contend on their own shard plus the one swarm's lock; swarm creation and
/// deletion are the only cross-swarm writes.
pub struct SwarmIndex {
    swarms: DashMap<InfoHash, Arc<Swarm>>,
    /// Single-flight guards so at most one store load runs per info hash.
    loading: DashMap<InfoHash, Arc<tokio::sync::Mutex<()>>>,
}

impl SwarmIndex {
    pub fn new() -> Self {
        Self {
            swarms: DashMap::new(),
            loading: DashMap::new(),
        }
    }

    pub fn get(&self, info_hash: &InfoHash) -> Option<Arc<Swarm>> {
        self.swarms.get(info_hash).map(|entry| Arc::clone(&entry))
    }

    pub fn insert(&self, torrent: Torrent) -> Arc<Swarm> {
        let swarm = Arc::new(Swarm::new(torrent.clone()));
        self.swarms.insert(torrent.info_hash, Arc::clone(&swarm));
        swarm
    }

    pub fn remove(&self, info_hash: &InfoHash) -> Option<Arc<Swarm>> {
        self.swarms.remove(info_hash).map(|(_, swarm)| swarm)
    }

    /// Resolve a swarm, loading the torrent from the store on first sight.
    ///
    /// With `auto_register` a hash the store has never seen is registered on
    /// the fly; otherwise unknown (and deleted) hashes come back `NotFound`.
    pub async fn get_or_load(
        &self,
        info_hash: &InfoHash,
        store: &dyn Store,
        auto_register: bool,
    ) -> StoreResult<Arc<Swarm>> {
        if let Some(swarm) = self.get(info_hash) {
            return Ok(swarm);
        }

        let guard = self
            .loading
            .entry(*info_hash)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _held = guard.lock().await;

        // A concurrent loader may have won while we waited
        if let Some(swarm) = self.get(info_hash) {
            self.loading.remove(info_hash);
            return Ok(swarm);
        }

        let torrent = match store.torrent_by_info_hash(info_hash, false).await {
            Ok(torrent) => torrent,
            Err(StoreError::NotFound) if auto_register => {
                // A soft-deleted torrent must stay hidden, not be re-registered
                if store.torrent_by_info_hash(info_hash, true).await.is_ok() {
                    self.loading.remove(info_hash);
                    return Err(StoreError::NotFound);
                }
                let torrent = Torrent::new(*info_hash, "");
                match store.torrent_add(torrent.clone()).await {
                    Ok(()) | Err(StoreError::Duplicate) => torrent,
                    Err(e) => {
                        self.loading.remove(info_hash);
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                self.loading.remove(info_hash);
                return Err(e);
            }
        };

        let swarm = self.insert(torrent);
        self.loading.remove(info_hash);
        Ok(swarm)
    }

    pub fn len(&self) -> usize {
        self.swarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swarms.is_empty()
    }

    pub fn peer_count(&self) -> usize {
        self.swarms
            .iter()
            .map(|entry| entry.value().peer_count())
            .sum()
    }

    /// Cheap (info_hash, seeders, leechers) read for metrics and the batch
    /// writer.
    pub fn snapshot_stats(&self) -> Vec<(InfoHash, i32, i32)> {
        self.swarms
            .iter()
            .map(|entry| {
                let (seeders, leechers) = entry.value().counts();
                (*entry.key(), seeders, leechers)
            })
            .collect()
    }

    /// Sweep every swarm, evicting stale peers. `on_swarm` fires for each
    /// swarm that lost peers. Yields between swarms so one sweep never
    /// blocks announces for longer than a single swarm's lock span.
    pub async fn reap(
        &self,
        now: i64,
        ttl: i64,
        mut on_swarm: impl FnMut(InfoHash, usize, i32, i32),
    ) -> usize {
        let hashes: Vec<InfoHash> = self.swarms.iter().map(|entry| *entry.key()).collect();

        let mut total = 0;
        for info_hash in hashes {
            if let Some(swarm) = self.get(&info_hash) {
                let (evicted, seeders, leechers) = swarm.reap(now, ttl);
                if evicted > 0 {
                    total += evicted;
                    on_swarm(info_hash, evicted, seeders, leechers);
                }
            }
            tokio::task::yield_now().await;
        }

        total
    }
}

impl Default for SwarmIndex {
    fn default() -> Self {
        Self::new()
    }
}
