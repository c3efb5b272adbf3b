use serde::{Deserialize, Serialize};

use crate::proto::ids::InfoHash;

/// A tracked torrent and its rolled-up swarm counters.
///
/// `is_deleted` hides the torrent entirely (announces fail as if the hash
/// were unknown); `is_enabled = false` keeps it visible but rejects announces
/// with the operator-supplied `reason`. All byte/announce counters are
/// monotonic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Torrent {
    pub info_hash: InfoHash,
    pub release_name: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub reason: String,
    /// Upload multiplier applied to user totals.
    #[serde(default = "default_multi")]
    pub multi_up: f64,
    /// Download multiplier applied to user totals; 0 denotes freeleech.
    #[serde(default = "default_multi")]
    pub multi_dn: f64,
    #[serde(default)]
    pub snatches: u16,
    #[serde(default)]
    pub uploaded: u64,
    #[serde(default)]
    pub downloaded: u64,
    #[serde(default)]
    pub announces: u64,
    #[serde(default)]
    pub seeders: i32,
    #[serde(default)]
    pub leechers: i32,
}

fn default_enabled() -> bool {
    true
}

fn default_multi() -> f64 {
    1.0
}

impl Torrent {
    pub fn new(info_hash: InfoHash, release_name: &str) -> Self {
        Self {
            info_hash,
            release_name: release_name.to_string(),
            is_deleted: false,
            is_enabled: true,
            reason: String::new(),
            multi_up: 1.0,
            multi_dn: 1.0,
            snatches: 0,
            uploaded: 0,
            downloaded: 0,
            announces: 0,
            seeders: 0,
            leechers: 0,
        }
    }

    pub fn is_freeleech(&self) -> bool {
        self.multi_dn == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_torrent_defaults() {
        let ih = InfoHash::from_bytes(&[1u8; 20]).unwrap();
        let torrent = Torrent::new(ih, "debian-12.5.0-amd64-DVD-1.iso");

        assert!(torrent.is_enabled);
        assert!(!torrent.is_deleted);
        assert_eq!(torrent.multi_up, 1.0);
        assert_eq!(torrent.multi_dn, 1.0);
        assert!(!torrent.is_freeleech());
        assert_eq!(torrent.snatches, 0);
    }

    #[test]
    fn test_freeleech_is_zero_download_multiplier() {
        let ih = InfoHash::from_bytes(&[1u8; 20]).unwrap();
        let mut torrent = Torrent::new(ih, "x");
        torrent.multi_dn = 0.0;
        assert!(torrent.is_freeleech());
    }
}
