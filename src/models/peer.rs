use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::geo::GeoInfo;
use crate::proto::ids::PeerID;

/// An active peer in one swarm.
///
/// `uploaded`/`downloaded` hold the client-reported cumulative totals; the
/// announce engine computes deltas against them before overwriting, so they
/// only ever grow (negative client resets clamp to zero).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: PeerID,
    pub user_id: u32,
    pub ip: IpAddr,
    pub port: u16,
    /// Bytes left to download; 0 marks a seeder.
    pub left: u32,
    pub uploaded: u64,
    pub downloaded: u64,
    pub announces: u32,
    pub announce_first: i64,
    pub announce_prev: i64,
    pub announce_last: i64,
    /// Accumulated active seconds, capped per announce gap.
    pub total_time: u32,
    pub speed_up: f64,
    pub speed_dn: f64,
    pub speed_up_max: f64,
    pub speed_dn_max: f64,
    /// Client string from the User-Agent header, or the peer-id prefix.
    pub agent: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub asn: u32,
    #[serde(default)]
    pub as_name: String,
    #[serde(default)]
    pub crypto_level: u8,
    #[serde(default)]
    pub paused: bool,
}

impl Peer {
    pub fn new(peer_id: PeerID, user_id: u32, ip: IpAddr, port: u16, now: i64) -> Self {
        Self {
            peer_id,
            user_id,
            ip,
            port,
            left: 0,
            uploaded: 0,
            downloaded: 0,
            announces: 0,
            announce_first: now,
            announce_prev: now,
            announce_last: now,
            total_time: 0,
            speed_up: 0.0,
            speed_dn: 0.0,
            speed_up_max: 0.0,
            speed_dn_max: 0.0,
            agent: peer_id.client_prefix(),
            country_code: String::new(),
            asn: 0,
            as_name: String::new(),
            crypto_level: 0,
            paused: false,
        }
    }

    pub fn is_seeder(&self) -> bool {
        self.left == 0
    }

    /// Hit-and-run: a leecher that has been in the swarm at least `threshold`
    /// seconds without completing. Flagged only, never enforced here.
    pub fn is_hnr(&self, now: i64, threshold: i64) -> bool {
        self.left > 0 && now - self.announce_first >= threshold
    }

    pub fn set_geo(&mut self, info: &GeoInfo) {
        self.country_code = info.country_code.clone();
        self.asn = info.asn;
        self.as_name = info.as_name.clone();
    }

    /// Fold one announce into the peer and return the clamped
    /// `(uploaded, downloaded)` byte deltas.
    ///
    /// A gap longer than four announce intervals counts as idle: no
    /// `total_time` accrual and zero instantaneous speed. Peak speeds are
    /// monotonic.
    pub fn apply_announce(
        &mut self,
        uploaded: u64,
        downloaded: u64,
        left: u32,
        now: i64,
        ann_interval: u32,
    ) -> (u64, u64) {
        let ul_delta = uploaded.saturating_sub(self.uploaded);
        let dl_delta = downloaded.saturating_sub(self.downloaded);

        self.uploaded = uploaded;
        self.downloaded = downloaded;
        self.left = left;
        self.announces += 1;

        let delta_t = now - self.announce_last;
        self.announce_prev = self.announce_last;
        self.announce_last = now;

        let idle_cap = i64::from(ann_interval) * 4;
        if delta_t > 0 && delta_t <= idle_cap {
            self.total_time += delta_t as u32;
            self.speed_up = ul_delta as f64 / delta_t as f64;
            self.speed_dn = dl_delta as f64 / delta_t as f64;
        } else {
            self.speed_up = 0.0;
            self.speed_dn = 0.0;
        }

        if self.speed_up > self.speed_up_max {
            self.speed_up_max = self.speed_up;
        }
        if self.speed_dn > self.speed_dn_max {
            self.speed_dn_max = self.speed_dn;
        }

        (ul_delta, dl_delta)
    }
}
