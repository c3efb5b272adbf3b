use std::net::IpAddr;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use super::Tracker;
use crate::core::error::AnnounceError;
use crate::db::{PeerStatsDelta, StoreError, TorrentStatsDelta, UserStatsDelta};
use crate::models::peer::Peer;
use crate::proto::ids::{Passkey, PeerHash};
use crate::proto::response::AnnounceReply;
use crate::utils::time::current_timestamp;
use crate::validation::params::{AnnounceEvent, AnnounceRequest};

/// Peers handed out when the client does not ask for a count.
const DEFAULT_NUMWANT: usize = 30;

/// Transport-level facts about the announcing client, resolved by the HTTP
/// layer before the engine runs.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: IpAddr,
    pub agent: Option<String>,
}

impl Tracker {
    pub async fn announce(
        &self,
        passkey: &Passkey,
        request: &AnnounceRequest,
        client: &ClientInfo,
    ) -> Result<AnnounceReply, AnnounceError> {
        self.announce_at(passkey, request, client, current_timestamp())
            .await
    }

    /// The announce state machine, at an explicit instant so tests control
    /// the clock.
    pub async fn announce_at(
        &self,
        passkey: &Passkey,
        request: &AnnounceRequest,
        client: &ClientInfo,
        now: i64,
    ) -> Result<AnnounceReply, AnnounceError> {
        if !request.compact {
            return Err(AnnounceError::NotSupported);
        }

        let user = match self.users.get(passkey) {
            Some(user) => user,
            None => {
                let user = self
                    .store
                    .user_by_passkey(passkey)
                    .await
                    .map_err(|e| match e {
                        StoreError::NotFound => AnnounceError::Unauthorized,
                        _ => AnnounceError::Internal,
                    })?;
                self.users.insert(user)
            }
        };
        if !user.valid() {
            return Err(AnnounceError::Unauthorized);
        }

        if !self.settings.public.load(Ordering::Relaxed)
            && !self.whitelist.permitted(&request.peer_id)
        {
            return Err(AnnounceError::ClientNotAllowed);
        }

        let stopped = request.event == Some(AnnounceEvent::Stopped);

        // Leeching requires download rights; seeding and leaving do not
        if request.left > 0 && !stopped && !user.download_enabled {
            return Err(AnnounceError::Unauthorized);
        }

        let auto_register = self.settings.auto_register.load(Ordering::Relaxed);
        let swarm = self
            .swarms
            .get_or_load(&request.info_hash, self.store.as_ref(), auto_register)
            .await?;

        let torrent_meta = swarm.torrent();
        if torrent_meta.is_deleted {
            return Err(AnnounceError::InvalidInfoHash);
        }
        if !torrent_meta.is_enabled {
            let reason = if torrent_meta.reason.is_empty() {
                "torrent disabled".to_string()
            } else {
                torrent_meta.reason.clone()
            };
            return Err(AnnounceError::TorrentDisabled(reason));
        }

        let ann_interval = self.settings.announce_interval.load(Ordering::Relaxed);
        let ann_interval_min = self.settings.announce_interval_min.load(Ordering::Relaxed);

        let existing = swarm.peer(&request.peer_id);

        // Interval-less re-announces under the floor get throttled; event
        // announces (start/stop/complete) always pass
        if request.event.is_none() {
            if let Some(peer) = &existing {
                if now - peer.announce_last < i64::from(ann_interval_min) {
                    return Err(AnnounceError::RequestTooFrequent);
                }
            }
        }

        if stopped {
            if let Some(peer) = swarm.remove_peer(&request.peer_id) {
                // Flagged only; enforcement belongs to the backend
                let hnr_threshold = i64::from(self.settings.hnr_threshold.load(Ordering::Relaxed));
                if peer.is_hnr(now, hnr_threshold) {
                    info!(
                        info_hash = %request.info_hash,
                        user_id = peer.user_id,
                        "Peer left the swarm incomplete past the hit-and-run threshold"
                    );
                }

                if let Err(e) = self
                    .store
                    .peer_delete(&request.info_hash, &request.peer_id)
                    .await
                {
                    warn!(info_hash = %request.info_hash, error = %e, "Failed to delete stopped peer from store");
                }

                let (seeders, leechers) = swarm.counts();
                self.batch.queue_torrent(TorrentStatsDelta {
                    info_hash: request.info_hash,
                    uploaded: 0,
                    downloaded: 0,
                    announces: 0,
                    snatches: 0,
                    seeders,
                    leechers,
                });
            }

            let (seeders, leechers) = swarm.counts();
            return Ok(AnnounceReply {
                interval: ann_interval,
                min_interval: ann_interval_min,
                complete: seeders,
                incomplete: leechers,
                peers: Vec::new(),
            });
        }

        let completed = request.event == Some(AnnounceEvent::Completed);
        // A completed announce is the moment the download finished; the peer
        // is a seeder from here on regardless of a stale left value
        let effective_left = if completed {
            0
        } else {
            request.left.min(u64::from(u32::MAX)) as u32
        };

        // Geo attributes attach once, at peer creation
        let geo_info = if existing.is_none() && self.settings.geodb_enabled.load(Ordering::Relaxed)
        {
            self.geo.lookup(client.ip)
        } else {
            None
        };

        let peer_id = request.peer_id;
        let user_id = user.user_id;
        let result = swarm.upsert_peer(
            peer_id,
            || {
                let mut peer = Peer::new(peer_id, user_id, client.ip, request.port, now);
                if let Some(agent) = &client.agent {
                    peer.agent = agent.clone();
                }
                if let Some(info) = &geo_info {
                    peer.set_geo(info);
                }
                peer.crypto_level = request.crypto_level;
                peer
            },
            |peer| {
                peer.ip = client.ip;
                peer.port = request.port;
                peer.paused = request.paused;
                peer.apply_announce(
                    request.uploaded,
                    request.downloaded,
                    effective_left,
                    now,
                    ann_interval,
                )
            },
        );

        // A snatch counts once per peer: on the completed announce that
        // turned a non-seeder into a seeder
        let snatched = completed && !result.was_seeder;

        let (seeders, leechers) = swarm.with_torrent_mut(|torrent| {
            torrent.uploaded += result.ul_delta;
            torrent.downloaded += result.dl_delta;
            torrent.announces += 1;
            if snatched {
                torrent.snatches += 1;
            }
            (torrent.seeders, torrent.leechers)
        });

        let user_ul = (result.ul_delta as f64 * torrent_meta.multi_up) as u64;
        let user_dl = if user.download_enabled {
            (result.dl_delta as f64 * torrent_meta.multi_dn) as u64
        } else {
            0
        };
        self.batch.queue_user(UserStatsDelta {
            passkey: *passkey,
            uploaded: user_ul,
            downloaded: user_dl,
            announces: 1,
        });

        self.batch.queue_torrent(TorrentStatsDelta {
            info_hash: request.info_hash,
            uploaded: result.ul_delta,
            downloaded: result.dl_delta,
            announces: 1,
            snatches: u16::from(snatched),
            seeders,
            leechers,
        });

        if let Some(peer) = swarm.peer(&peer_id) {
            if result.created {
                if let Err(e) = self.store.peer_add(&request.info_hash, peer.clone()).await {
                    warn!(info_hash = %request.info_hash, error = %e, "Failed to persist new peer");
                }
            }

            self.batch.queue_peer(PeerStatsDelta {
                peer_hash: PeerHash::new(request.info_hash, peer_id),
                uploaded: result.ul_delta,
                downloaded: result.dl_delta,
                announces: 1,
                left: peer.left,
                announce_last: peer.announce_last,
                total_time: peer.total_time,
                speed_up: peer.speed_up,
                speed_dn: peer.speed_dn,
                speed_up_max: peer.speed_up_max,
                speed_dn_max: peer.speed_dn_max,
                paused: peer.paused,
            });
        }

        let max_peers = self.settings.max_peers.load(Ordering::Relaxed) as usize;
        let want = request
            .numwant
            .map_or(DEFAULT_NUMWANT, |n| n as usize)
            .min(max_peers);
        let client_v6 = client.ip.is_ipv6();
        let ipv6_allowed = client_v6 || request.ipv6.is_some();
        let peers = swarm.select_peers(want, &peer_id, client_v6, ipv6_allowed);

        Ok(AnnounceReply {
            interval: ann_interval,
            min_interval: ann_interval_min,
            complete: seeders,
            incomplete: leechers,
            peers,
        })
    }
}
