pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::peer::Peer;
use crate::models::torrent::Torrent;
use crate::models::user::User;
use crate::models::whitelist::WhiteListClient;
use crate::proto::ids::{InfoHash, Passkey, PeerHash, PeerID};

/// Errors surfaced by store drivers. The announce path maps `NotFound` into
/// protocol errors; everything else is logged and retried out of band.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("duplicate entry")]
    Duplicate,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Additive per-user stat deltas flushed by the batch writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserStatsDelta {
    pub passkey: Passkey,
    pub uploaded: u64,
    pub downloaded: u64,
    pub announces: u32,
}

/// Per-torrent stat deltas. Byte/announce/snatch fields are additive;
/// `seeders`/`leechers` carry the latest observed values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TorrentStatsDelta {
    pub info_hash: InfoHash,
    pub uploaded: u64,
    pub downloaded: u64,
    pub announces: u64,
    pub snatches: u16,
    pub seeders: i32,
    pub leechers: i32,
}

/// Per-peer stat deltas. Byte/announce fields are additive; the rest carry
/// the latest observed values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerStatsDelta {
    pub peer_hash: PeerHash,
    pub uploaded: u64,
    pub downloaded: u64,
    pub announces: u32,
    pub left: u32,
    pub announce_last: i64,
    pub total_time: u32,
    pub speed_up: f64,
    pub speed_dn: f64,
    pub speed_up_max: f64,
    pub speed_dn_max: f64,
    pub paused: bool,
}

/// The durable backing store consumed by the tracker core.
///
/// The store is eventually consistent with in-memory truth between batch
/// ticks; nothing on the announce path waits for it except entity loads on
/// cache miss.
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn user_by_passkey(&self, passkey: &Passkey) -> StoreResult<User>;
    async fn user_add(&self, user: User) -> StoreResult<()>;
    async fn user_update(&self, passkey: &Passkey, user: User) -> StoreResult<()>;
    /// Soft delete: the user stops resolving but counters are preserved.
    async fn user_delete(&self, passkey: &Passkey) -> StoreResult<()>;
    async fn user_update_stats(&self, deltas: Vec<UserStatsDelta>) -> StoreResult<()>;

    // Torrents
    async fn torrent_by_info_hash(
        &self,
        info_hash: &InfoHash,
        include_deleted: bool,
    ) -> StoreResult<Torrent>;
    async fn torrent_add(&self, torrent: Torrent) -> StoreResult<()>;
    async fn torrent_update(&self, torrent: Torrent) -> StoreResult<()>;
    async fn torrent_delete(&self, info_hash: &InfoHash) -> StoreResult<()>;
    async fn torrent_update_stats(&self, deltas: Vec<TorrentStatsDelta>) -> StoreResult<()>;

    // Peers
    async fn peer_add(&self, info_hash: &InfoHash, peer: Peer) -> StoreResult<()>;
    async fn peer_delete(&self, info_hash: &InfoHash, peer_id: &PeerID) -> StoreResult<()>;
    /// Drop peer rows whose last announce is older than `before_ts`. Drivers
    /// may no-op when the core's reaper already deletes row by row.
    async fn peer_reap(&self, before_ts: i64) -> StoreResult<u64>;
    async fn peer_update_stats(&self, deltas: Vec<PeerStatsDelta>) -> StoreResult<()>;

    // Whitelist
    async fn whitelist_get_all(&self) -> StoreResult<Vec<WhiteListClient>>;
    async fn whitelist_add(&self, client: WhiteListClient) -> StoreResult<()>;
    async fn whitelist_delete(&self, client_prefix: &str) -> StoreResult<()>;
}
