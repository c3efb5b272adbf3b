use serde::{Deserialize, Serialize};

use crate::proto::ids::PeerID;

/// A whitelisted BitTorrent client, identified by the fixed prefix its
/// releases stamp into the peer id. Trivial to spoof, so this is a gate
/// against misconfigured clients rather than a security boundary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhiteListClient {
    pub client_prefix: String,
    pub client_name: String,
}

impl WhiteListClient {
    pub fn new(client_prefix: &str, client_name: &str) -> Self {
        Self {
            client_prefix: client_prefix.to_string(),
            client_name: client_name.to_string(),
        }
    }

    pub fn matches(&self, peer_id: &PeerID) -> bool {
        peer_id.as_bytes().starts_with(self.client_prefix.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_id(prefix: &[u8]) -> PeerID {
        let mut raw = [b'x'; 20];
        raw[..prefix.len()].copy_from_slice(prefix);
        PeerID::from_bytes(&raw).unwrap()
    }

    #[test]
    fn test_prefix_match() {
        let wl = WhiteListClient::new("-qB45", "qBittorrent 4.5");
        assert!(wl.matches(&peer_id(b"-qB4500-")));
        assert!(!wl.matches(&peer_id(b"-TR4000-")));
    }

    #[test]
    fn test_prefix_is_anchored_at_start() {
        let wl = WhiteListClient::new("-UT", "uTorrent");
        assert!(!wl.matches(&peer_id(b"xx-UT355")));
    }
}
