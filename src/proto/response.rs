use std::net::IpAddr;

/// A peer endpoint as handed back to announcing clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

/// Everything the announce engine resolves for one successful announce.
/// The transport layer turns this into the bencoded wire body.
#[derive(Clone, Debug)]
pub struct AnnounceReply {
    pub interval: u32,
    pub min_interval: u32,
    pub complete: i32,
    pub incomplete: i32,
    pub peers: Vec<PeerEndpoint>,
}

/// Writer for the only two bodies this tracker emits: the announce reply
/// dictionary and the `failure reason` dictionary. Callers push entries in
/// sorted key order, which is all the bencoding the wire format needs here.
struct ReplyDict {
    buf: Vec<u8>,
}

impl ReplyDict {
    fn with_capacity(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity);
        buf.push(b'd');
        Self { buf }
    }

    fn int_entry(&mut self, key: &str, value: i64) {
        self.byte_string(key.as_bytes());
        self.buf.push(b'i');
        let mut digits = itoa::Buffer::new();
        self.buf.extend_from_slice(digits.format(value).as_bytes());
        self.buf.push(b'e');
    }

    fn bytes_entry(&mut self, key: &str, value: &[u8]) {
        self.byte_string(key.as_bytes());
        self.byte_string(value);
    }

    fn byte_string(&mut self, bytes: &[u8]) {
        let mut digits = itoa::Buffer::new();
        self.buf.extend_from_slice(digits.format(bytes.len()).as_bytes());
        self.buf.push(b':');
        self.buf.extend_from_slice(bytes);
    }

    fn finish(mut self) -> Vec<u8> {
        self.buf.push(b'e');
        self.buf
    }
}

/// Bencode a successful announce reply.
///
/// Entries go out in sorted key order: `complete`, `incomplete`,
/// `interval`, `min interval`, `peers`, `peers6`. IPv4 peers pack into
/// 6 bytes each, IPv6 peers into 18; `peers6` is only present when at
/// least one IPv6 peer was selected.
pub fn encode_reply(reply: &AnnounceReply) -> Vec<u8> {
    let mut dict = ReplyDict::with_capacity(96 + reply.peers.len() * 18);

    dict.int_entry("complete", i64::from(reply.complete));
    dict.int_entry("incomplete", i64::from(reply.incomplete));
    dict.int_entry("interval", i64::from(reply.interval));
    dict.int_entry("min interval", i64::from(reply.min_interval));

    dict.bytes_entry("peers", &pack_v4(&reply.peers));

    let v6 = pack_v6(&reply.peers);
    if !v6.is_empty() {
        dict.bytes_entry("peers6", &v6);
    }

    dict.finish()
}

/// Bencode a tracker-level failure. By convention these travel with HTTP 200;
/// non-2xx statuses are reserved for transport faults.
pub fn encode_failure(reason: &str) -> Vec<u8> {
    let mut dict = ReplyDict::with_capacity(32 + reason.len());
    dict.bytes_entry("failure reason", reason.as_bytes());
    dict.finish()
}

fn pack_v4(peers: &[PeerEndpoint]) -> Vec<u8> {
    let count = peers.iter().filter(|p| p.ip.is_ipv4()).count();
    let mut packed = Vec::with_capacity(count * 6);

    for peer in peers {
        if let IpAddr::V4(ip) = peer.ip {
            packed.extend_from_slice(&ip.octets());
            packed.extend_from_slice(&peer.port.to_be_bytes());
        }
    }

    packed
}

fn pack_v6(peers: &[PeerEndpoint]) -> Vec<u8> {
    let count = peers.iter().filter(|p| p.ip.is_ipv6()).count();
    let mut packed = Vec::with_capacity(count * 18);

    for peer in peers {
        if let IpAddr::V6(ip) = peer.ip {
            packed.extend_from_slice(&ip.octets());
            packed.extend_from_slice(&peer.port.to_be_bytes());
        }
    }

    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> PeerEndpoint {
        PeerEndpoint {
            ip: IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
            port,
        }
    }

    /// Pull the compact `peers` payload back out of an encoded reply.
    fn extract_peers(encoded: &[u8]) -> Vec<(Ipv4Addr, u16)> {
        let marker = b"5:peers";
        let start = encoded
            .windows(marker.len())
            .position(|w| w == marker)
            .expect("peers key present")
            + marker.len();
        let colon = start
            + encoded[start..]
                .iter()
                .position(|&b| b == b':')
                .expect("length prefix");
        let len: usize = std::str::from_utf8(&encoded[start..colon])
            .unwrap()
            .parse()
            .unwrap();
        let body = &encoded[colon + 1..colon + 1 + len];

        body.chunks(6)
            .map(|c| {
                (
                    Ipv4Addr::new(c[0], c[1], c[2], c[3]),
                    u16::from_be_bytes([c[4], c[5]]),
                )
            })
            .collect()
    }

    #[test]
    fn test_reply_contains_counts_and_intervals() {
        let reply = AnnounceReply {
            interval: 1800,
            min_interval: 900,
            complete: 5,
            incomplete: 3,
            peers: vec![v4(192, 168, 1, 1, 6881)],
        };

        let encoded = encode_reply(&reply);
        let text = String::from_utf8_lossy(&encoded);

        assert!(text.starts_with('d'));
        assert!(text.ends_with('e'));
        assert!(text.contains("8:completei5e"));
        assert!(text.contains("10:incompletei3e"));
        assert!(text.contains("8:intervali1800e"));
        assert!(text.contains("12:min intervali900e"));
    }

    #[test]
    fn test_compact_roundtrip_preserves_order() {
        let reply = AnnounceReply {
            interval: 1800,
            min_interval: 900,
            complete: 0,
            incomplete: 2,
            peers: vec![v4(192, 168, 1, 1, 6881), v4(10, 0, 0, 1, 51413)],
        };

        let decoded = extract_peers(&encode_reply(&reply));
        assert_eq!(
            decoded,
            vec![
                (Ipv4Addr::new(192, 168, 1, 1), 6881),
                (Ipv4Addr::new(10, 0, 0, 1), 51413),
            ]
        );
    }

    #[test]
    fn test_peers_length_is_multiple_of_six() {
        for n in 0..5 {
            let peers: Vec<_> = (0..n).map(|i| v4(10, 0, 0, i as u8 + 1, 6881)).collect();
            let reply = AnnounceReply {
                interval: 1800,
                min_interval: 900,
                complete: 0,
                incomplete: n as i32,
                peers,
            };
            let decoded = extract_peers(&encode_reply(&reply));
            assert_eq!(decoded.len(), n);
        }
    }

    #[test]
    fn test_peers6_only_present_with_ipv6_peers() {
        let v4_only = AnnounceReply {
            interval: 1800,
            min_interval: 900,
            complete: 1,
            incomplete: 0,
            peers: vec![v4(192, 168, 1, 1, 6881)],
        };
        let encoded = encode_reply(&v4_only);
        assert!(!String::from_utf8_lossy(&encoded).contains("peers6"));

        let mixed = AnnounceReply {
            peers: vec![
                v4(192, 168, 1, 1, 6881),
                PeerEndpoint {
                    ip: IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
                    port: 6882,
                },
            ],
            ..v4_only
        };
        let encoded = encode_reply(&mixed);
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("6:peers618:"));
    }

    #[test]
    fn test_ipv6_payload_packs_address_and_port() {
        let ip = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let packed = pack_v6(&[PeerEndpoint {
            ip: IpAddr::V6(ip),
            port: 6882,
        }]);

        assert_eq!(packed.len(), 18);
        assert_eq!(&packed[..16], &ip.octets());
        assert_eq!(&packed[16..], &6882u16.to_be_bytes());
    }

    #[test]
    fn test_empty_peer_list() {
        let reply = AnnounceReply {
            interval: 1800,
            min_interval: 900,
            complete: 0,
            incomplete: 0,
            peers: Vec::new(),
        };
        let text = String::from_utf8_lossy(&encode_reply(&reply)).to_string();
        assert!(text.contains("5:peers0:"));
        assert!(!text.contains("peers6"));
    }

    #[test]
    fn test_encode_failure() {
        assert_eq!(
            encode_failure("retired"),
            b"d14:failure reason7:retirede".to_vec()
        );
    }
}
