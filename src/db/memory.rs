use async_trait::async_trait;
use dashmap::DashMap;

use super::{PeerStatsDelta, Store, StoreError, StoreResult, TorrentStatsDelta, UserStatsDelta};
use crate::models::peer::Peer;
use crate::models::torrent::Torrent;
use crate::models::user::User;
use crate::models::whitelist::WhiteListClient;
use crate::proto::ids::{InfoHash, Passkey, PeerHash, PeerID};

/// Process-local store driver. The default for development and the fixture
/// every engine test runs against.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Passkey, User>,
    torrents: DashMap<InfoHash, Torrent>,
    peers: DashMap<PeerHash, Peer>,
    whitelist: DashMap<String, WhiteListClient>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn torrent_count(&self) -> usize {
        self.torrents.len()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_passkey(&self, passkey: &Passkey) -> StoreResult<User> {
        let user = self
            .users
            .get(passkey)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)?;
        if !user.valid() {
            return Err(StoreError::NotFound);
        }
        Ok(user)
    }

    async fn user_add(&self, user: User) -> StoreResult<()> {
        if self.users.contains_key(&user.passkey) {
            return Err(StoreError::Duplicate);
        }
        self.users.insert(user.passkey, user);
        Ok(())
    }

    async fn user_update(&self, passkey: &Passkey, user: User) -> StoreResult<()> {
        if !self.users.contains_key(passkey) {
            return Err(StoreError::NotFound);
        }
        if *passkey != user.passkey {
            // Passkey rotation moves the row
            self.users.remove(passkey);
        }
        self.users.insert(user.passkey, user);
        Ok(())
    }

    async fn user_delete(&self, passkey: &Passkey) -> StoreResult<()> {
        let mut user = self.users.get_mut(passkey).ok_or(StoreError::NotFound)?;
        user.is_deleted = true;
        Ok(())
    }

    async fn user_update_stats(&self, deltas: Vec<UserStatsDelta>) -> StoreResult<()> {
        for delta in deltas {
            if let Some(mut user) = self.users.get_mut(&delta.passkey) {
                user.uploaded += delta.uploaded;
                user.downloaded += delta.downloaded;
                user.announces += delta.announces;
            }
        }
        Ok(())
    }

    async fn torrent_by_info_hash(
        &self,
        info_hash: &InfoHash,
        include_deleted: bool,
    ) -> StoreResult<Torrent> {
        let torrent = self
            .torrents
            .get(info_hash)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)?;
        if torrent.is_deleted && !include_deleted {
            return Err(StoreError::NotFound);
        }
        Ok(torrent)
    }

    async fn torrent_add(&self, torrent: Torrent) -> StoreResult<()> {
        if self.torrents.contains_key(&torrent.info_hash) {
            return Err(StoreError::Duplicate);
        }
        self.torrents.insert(torrent.info_hash, torrent);
        Ok(())
    }

    async fn torrent_update(&self, torrent: Torrent) -> StoreResult<()> {
        if !self.torrents.contains_key(&torrent.info_hash) {
            return Err(StoreError::NotFound);
        }
        self.torrents.insert(torrent.info_hash, torrent);
        Ok(())
    }

    async fn torrent_delete(&self, info_hash: &InfoHash) -> StoreResult<()> {
        self.torrents
            .remove(info_hash)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn torrent_update_stats(&self, deltas: Vec<TorrentStatsDelta>) -> StoreResult<()> {
        for delta in deltas {
            if let Some(mut torrent) = self.torrents.get_mut(&delta.info_hash) {
                torrent.uploaded += delta.uploaded;
                torrent.downloaded += delta.downloaded;
                torrent.announces += delta.announces;
                torrent.snatches += delta.snatches;
                torrent.seeders = delta.seeders;
                torrent.leechers = delta.leechers;
            }
        }
        Ok(())
    }

    async fn peer_add(&self, info_hash: &InfoHash, peer: Peer) -> StoreResult<()> {
        let key = PeerHash::new(*info_hash, peer.peer_id);
        self.peers.insert(key, peer);
        Ok(())
    }

    async fn peer_delete(&self, info_hash: &InfoHash, peer_id: &PeerID) -> StoreResult<()> {
        self.peers.remove(&PeerHash::new(*info_hash, *peer_id));
        Ok(())
    }

    async fn peer_reap(&self, before_ts: i64) -> StoreResult<u64> {
        let before = self.peers.len();
        self.peers.retain(|_, peer| peer.announce_last >= before_ts);
        Ok((before - self.peers.len()) as u64)
    }

    async fn peer_update_stats(&self, deltas: Vec<PeerStatsDelta>) -> StoreResult<()> {
        for delta in deltas {
            if let Some(mut peer) = self.peers.get_mut(&delta.peer_hash) {
                peer.uploaded += delta.uploaded;
                peer.downloaded += delta.downloaded;
                peer.announces += delta.announces;
                peer.left = delta.left;
                peer.announce_last = delta.announce_last;
                peer.total_time = delta.total_time;
                peer.speed_up = delta.speed_up;
                peer.speed_dn = delta.speed_dn;
                peer.speed_up_max = delta.speed_up_max;
                peer.speed_dn_max = delta.speed_dn_max;
                peer.paused = delta.paused;
            }
        }
        Ok(())
    }

    async fn whitelist_get_all(&self) -> StoreResult<Vec<WhiteListClient>> {
        Ok(self
            .whitelist
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn whitelist_add(&self, client: WhiteListClient) -> StoreResult<()> {
        if self.whitelist.contains_key(&client.client_prefix) {
            return Err(StoreError::Duplicate);
        }
        self.whitelist.insert(client.client_prefix.clone(), client);
        Ok(())
    }

    async fn whitelist_delete(&self, client_prefix: &str) -> StoreResult<()> {
        self.whitelist
            .remove(client_prefix)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passkey() -> Passkey {
        Passkey::parse("aaaaaaaaaaaaaaaaaaaa").unwrap()
    }

    #[tokio::test]
    async fn test_user_lookup_and_soft_delete() {
        let store = MemoryStore::new();
        store.user_add(User::new(1, passkey())).await.unwrap();

        let user = store.user_by_passkey(&passkey()).await.unwrap();
        assert_eq!(user.user_id, 1);

        store.user_delete(&passkey()).await.unwrap();
        assert!(matches!(
            store.user_by_passkey(&passkey()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let store = MemoryStore::new();
        store.user_add(User::new(1, passkey())).await.unwrap();
        assert!(matches!(
            store.user_add(User::new(2, passkey())).await,
            Err(StoreError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn test_deleted_torrent_hidden_unless_requested() {
        let store = MemoryStore::new();
        let ih = InfoHash::from_bytes(&[7u8; 20]).unwrap();
        let mut torrent = Torrent::new(ih, "x");
        torrent.is_deleted = true;
        store.torrent_add(torrent).await.unwrap();

        assert!(matches!(
            store.torrent_by_info_hash(&ih, false).await,
            Err(StoreError::NotFound)
        ));
        // include_deleted makes un-delete possible from the admin surface
        assert!(store.torrent_by_info_hash(&ih, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_user_stats_are_additive() {
        let store = MemoryStore::new();
        store.user_add(User::new(1, passkey())).await.unwrap();

        for _ in 0..2 {
            store
                .user_update_stats(vec![UserStatsDelta {
                    passkey: passkey(),
                    uploaded: 100,
                    downloaded: 50,
                    announces: 1,
                }])
                .await
                .unwrap();
        }

        // Soft-deleted rows still accumulate; fetch bypassing validity
        let user = store.users.get(&passkey()).unwrap().value().clone();
        assert_eq!(user.uploaded, 200);
        assert_eq!(user.downloaded, 100);
        assert_eq!(user.announces, 2);
    }

    #[tokio::test]
    async fn test_peer_reap_drops_stale_rows() {
        let store = MemoryStore::new();
        let ih = InfoHash::from_bytes(&[7u8; 20]).unwrap();
        let pid = PeerID::from_bytes(b"-qB4500-aaaaaaaaaaaa").unwrap();

        let mut peer = Peer::new(pid, 1, "10.0.0.1".parse().unwrap(), 6881, 1000);
        peer.announce_last = 1000;
        store.peer_add(&ih, peer).await.unwrap();

        assert_eq!(store.peer_reap(500).await.unwrap(), 0);
        assert_eq!(store.peer_reap(2000).await.unwrap(), 1);
        assert_eq!(store.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_stats_update_persists_activity() {
        let store = MemoryStore::new();
        let ih = InfoHash::from_bytes(&[7u8; 20]).unwrap();
        let pid = PeerID::from_bytes(b"-qB4500-aaaaaaaaaaaa").unwrap();
        store
            .peer_add(&ih, Peer::new(pid, 1, "10.0.0.1".parse().unwrap(), 6881, 1000))
            .await
            .unwrap();

        let delta = |uploaded, announce_last, total_time| PeerStatsDelta {
            peer_hash: PeerHash::new(ih, pid),
            uploaded,
            downloaded: 0,
            announces: 1,
            left: 500,
            announce_last,
            total_time,
            speed_up: 1.0,
            speed_dn: 0.0,
            speed_up_max: 1.0,
            speed_dn_max: 0.0,
            paused: false,
        };

        store.peer_update_stats(vec![delta(100, 1100, 100)]).await.unwrap();
        store.peer_update_stats(vec![delta(50, 1250, 250)]).await.unwrap();

        let peer = store
            .peers
            .get(&PeerHash::new(ih, pid))
            .unwrap()
            .value()
            .clone();
        // Byte counters accumulate; activity time and timestamps last-win
        assert_eq!(peer.uploaded, 150);
        assert_eq!(peer.announces, 2);
        assert_eq!(peer.total_time, 250);
        assert_eq!(peer.announce_last, 1250);
    }

    #[tokio::test]
    async fn test_whitelist_round_trip() {
        let store = MemoryStore::new();
        store
            .whitelist_add(WhiteListClient::new("-qB", "qBittorrent"))
            .await
            .unwrap();

        assert_eq!(store.whitelist_get_all().await.unwrap().len(), 1);
        store.whitelist_delete("-qB").await.unwrap();
        assert!(store.whitelist_get_all().await.unwrap().is_empty());
        assert!(matches!(
            store.whitelist_delete("-qB").await,
            Err(StoreError::NotFound)
        ));
    }
}
