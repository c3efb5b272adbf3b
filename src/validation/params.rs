use anyhow::{bail, Context, Result};
use std::net::IpAddr;

use crate::proto::ids::{InfoHash, PeerID};
use crate::utils::hex::url_decode;

/// Raw announce query, split but not yet validated. `info_hash` and
/// `peer_id` hold the percent-decoded binary values; everything else is
/// still text.
#[derive(Debug, Default)]
pub struct AnnounceParams {
    pub info_hash: Vec<u8>,
    pub peer_id: Vec<u8>,
    pub port: Option<String>,
    pub uploaded: Option<String>,
    pub downloaded: Option<String>,
    pub left: Option<String>,
    pub event: String,
    pub numwant: Option<String>,
    pub compact: Option<String>,
    pub ip: Option<String>,
    pub ipv6: Option<String>,
    pub key: Option<String>,
    pub no_peer_id: bool,
    pub supportcrypto: bool,
    pub paused: bool,
}

/// Fully validated announce request as consumed by the engine.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub info_hash: InfoHash,
    pub peer_id: PeerID,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: Option<AnnounceEvent>,
    pub numwant: Option<u32>,
    pub compact: bool,
    pub ip: Option<IpAddr>,
    pub ipv6: Option<IpAddr>,
    pub crypto_level: u8,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
}

impl AnnounceParams {
    /// Split a raw (undecoded) query string. The binary parameters must be
    /// decoded here, before any UTF-8 handling touches them.
    pub fn parse_query(query: &str) -> Result<Self> {
        let mut params = Self::default();

        for pair in query.split('&') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };

            match name {
                "info_hash" => params.info_hash = url_decode(value)?,
                "peer_id" => params.peer_id = url_decode(value)?,
                "port" => params.port = Some(text_value(value)?),
                "uploaded" => params.uploaded = Some(text_value(value)?),
                "downloaded" => params.downloaded = Some(text_value(value)?),
                "left" => params.left = Some(text_value(value)?),
                "event" => params.event = text_value(value)?,
                "numwant" => params.numwant = Some(text_value(value)?),
                "compact" => params.compact = Some(text_value(value)?),
                "ip" => params.ip = Some(text_value(value)?),
                "ipv6" => params.ipv6 = Some(text_value(value)?),
                "key" => params.key = Some(text_value(value)?),
                "no_peer_id" => params.no_peer_id = value == "1",
                "supportcrypto" => params.supportcrypto = value == "1",
                "paused" => params.paused = value == "true" || value == "1",
                _ => {}
            }
        }

        Ok(params)
    }

    pub fn validate(self) -> Result<AnnounceRequest> {
        let info_hash =
            InfoHash::from_bytes(&self.info_hash).context("Invalid info_hash")?;
        let peer_id = PeerID::from_bytes(&self.peer_id).context("Invalid peer_id")?;

        let port: u16 = self
            .port
            .context("Missing port")?
            .parse()
            .context("Invalid port")?;
        if port == 0 {
            bail!("Port must be between 1 and 65535");
        }

        let uploaded: u64 = self
            .uploaded
            .context("Missing uploaded")?
            .parse()
            .context("Invalid uploaded")?;
        let downloaded: u64 = self
            .downloaded
            .context("Missing downloaded")?
            .parse()
            .context("Invalid downloaded")?;
        let left: u64 = self
            .left
            .context("Missing left")?
            .parse()
            .context("Invalid left")?;

        let event = match self.event.as_str() {
            "" => None,
            "started" => Some(AnnounceEvent::Started),
            "stopped" => Some(AnnounceEvent::Stopped),
            "completed" => Some(AnnounceEvent::Completed),
            other => bail!("Unknown event '{}'", other),
        };

        let numwant = match self.numwant {
            Some(raw) => Some(raw.parse::<u32>().context("Invalid numwant")?),
            None => None,
        };

        // Absent compact means a modern client; only an explicit 0 asks for
        // the dictionary model this tracker does not serve
        let compact = self.compact.as_deref() != Some("0");

        let ip = match self.ip {
            Some(raw) => Some(raw.parse::<IpAddr>().context("Invalid ip")?),
            None => None,
        };
        let ipv6 = match self.ipv6 {
            Some(raw) => Some(raw.parse::<IpAddr>().context("Invalid ipv6")?),
            None => None,
        };

        Ok(AnnounceRequest {
            info_hash,
            peer_id,
            port,
            uploaded,
            downloaded,
            left,
            event,
            numwant,
            compact,
            ip,
            ipv6,
            crypto_level: u8::from(self.supportcrypto),
            paused: self.paused,
        })
    }
}

fn text_value(value: &str) -> Result<String> {
    let bytes = url_decode(value)?;
    String::from_utf8(bytes).context("Parameter is not valid UTF-8")
}

/// RFC1918/loopback/link-local and otherwise unroutable addresses, rejected
/// unless the tracker is configured for lab use.
pub fn is_non_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_HASH: &str = "%12%34%56%78%9a%bc%de%f0%11%22%33%44%55%66%77%88%99%aa%bb%cc";
    const PEER_ID: &str = "-qB4500-abcdefghijkl";

    fn query(extra: &str) -> String {
        format!(
            "info_hash={}&peer_id={}&port=51413&uploaded=0&downloaded=0&left=1000{}",
            INFO_HASH, PEER_ID, extra
        )
    }

    #[test]
    fn test_parse_and_validate_minimal() {
        let request = AnnounceParams::parse_query(&query(""))
            .unwrap()
            .validate()
            .unwrap();

        assert_eq!(request.port, 51413);
        assert_eq!(request.left, 1000);
        assert_eq!(request.event, None);
        assert_eq!(request.numwant, None);
        assert!(request.compact);
        assert_eq!(request.peer_id.as_bytes(), b"-qB4500-abcdefghijkl");
    }

    #[test]
    fn test_binary_info_hash_survives_decoding() {
        let request = AnnounceParams::parse_query(&query(""))
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(request.info_hash.as_bytes()[0], 0x12);
        assert_eq!(request.info_hash.as_bytes()[19], 0xcc);
    }

    #[test]
    fn test_events() {
        for (text, expected) in [
            ("started", Some(AnnounceEvent::Started)),
            ("stopped", Some(AnnounceEvent::Stopped)),
            ("completed", Some(AnnounceEvent::Completed)),
        ] {
            let request = AnnounceParams::parse_query(&query(&format!("&event={}", text)))
                .unwrap()
                .validate()
                .unwrap();
            assert_eq!(request.event, expected);
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result = AnnounceParams::parse_query(&query("&event=paused"))
            .unwrap()
            .validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_required_parameter() {
        let query = format!("info_hash={}&peer_id={}&port=51413", INFO_HASH, PEER_ID);
        let result = AnnounceParams::parse_query(&query).unwrap().validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let query = format!(
            "info_hash={}&peer_id={}&port=0&uploaded=0&downloaded=0&left=0",
            INFO_HASH, PEER_ID
        );
        let result = AnnounceParams::parse_query(&query).unwrap().validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_short_info_hash_rejected() {
        let query = format!(
            "info_hash=%12%34&peer_id={}&port=6881&uploaded=0&downloaded=0&left=0",
            PEER_ID
        );
        let result = AnnounceParams::parse_query(&query).unwrap().validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_compact_flag() {
        let request = AnnounceParams::parse_query(&query("&compact=1"))
            .unwrap()
            .validate()
            .unwrap();
        assert!(request.compact);

        let request = AnnounceParams::parse_query(&query("&compact=0"))
            .unwrap()
            .validate()
            .unwrap();
        assert!(!request.compact);
    }

    #[test]
    fn test_ip_override_parses() {
        let request = AnnounceParams::parse_query(&query("&ip=93.184.216.34"))
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(request.ip, Some("93.184.216.34".parse().unwrap()));

        let result = AnnounceParams::parse_query(&query("&ip=not-an-ip"))
            .unwrap()
            .validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_non_routable_detection() {
        for addr in ["10.0.0.1", "192.168.1.1", "172.16.3.4", "127.0.0.1", "169.254.1.1", "::1", "fe80::1", "fc00::1"] {
            let ip: IpAddr = addr.parse().unwrap();
            assert!(is_non_routable(&ip), "{} should be non-routable", addr);
        }

        for addr in ["93.184.216.34", "8.8.8.8", "2001:db8::1"] {
            let ip: IpAddr = addr.parse().unwrap();
            assert!(!is_non_routable(&ip), "{} should be routable", addr);
        }
    }
}
