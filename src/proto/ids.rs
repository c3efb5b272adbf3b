use anyhow::{bail, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::utils::hex::{bytes_to_hex, hex_to_bytes};

/// 20-byte SHA-1 identifier of a torrent. Equality is bytewise; the string
/// form is lowercase base-16.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    pub const LEN: usize = 20;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            bail!("info_hash must be exactly 20 bytes, got {}", bytes.len());
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != Self::LEN * 2 {
            bail!("info_hash hex must be exactly 40 characters, got {}", s.len());
        }
        Self::from_bytes(&hex_to_bytes(s)?)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_hex(&self.0))
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self)
    }
}

/// 20-byte peer identifier chosen by the client. The leading bytes carry the
/// client prefix (e.g. `-qB4500-`) matched against the whitelist.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerID([u8; 20]);

impl PeerID {
    pub const LEN: usize = 20;

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            bail!("peer_id must be exactly 20 bytes, got {}", bytes.len());
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != Self::LEN * 2 {
            bail!("peer_id hex must be exactly 40 characters, got {}", s.len());
        }
        Self::from_bytes(&hex_to_bytes(s)?)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Printable client prefix, used as the fallback agent string when no
    /// User-Agent header is present.
    pub fn client_prefix(&self) -> String {
        self.0[..8]
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }
}

impl fmt::Display for PeerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_hex(&self.0))
    }
}

impl fmt::Debug for PeerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerID({})", self)
    }
}

/// 40-byte concatenation of an info hash and a peer id, used as the stable
/// key for per-peer stat deltas and peer rows in the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHash([u8; 40]);

impl PeerHash {
    pub fn new(info_hash: InfoHash, peer_id: PeerID) -> Self {
        let mut buf = [0u8; 40];
        buf[..20].copy_from_slice(info_hash.as_bytes());
        buf[20..].copy_from_slice(peer_id.as_bytes());
        Self(buf)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 80 {
            bail!("peer_hash hex must be exactly 80 characters, got {}", s.len());
        }
        let bytes = hex_to_bytes(s)?;
        let mut buf = [0u8; 40];
        buf.copy_from_slice(&bytes);
        Ok(Self(buf))
    }

    pub fn info_hash(&self) -> InfoHash {
        InfoHash::from_bytes(&self.0[..20]).expect("peer_hash holds a 20-byte info_hash")
    }

    pub fn peer_id(&self) -> PeerID {
        PeerID::from_bytes(&self.0[20..]).expect("peer_hash holds a 20-byte peer_id")
    }

    pub fn as_bytes(&self) -> &[u8; 40] {
        &self.0
    }
}

impl fmt::Display for PeerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_hex(&self.0))
    }
}

impl fmt::Debug for PeerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerHash({})", self)
    }
}

/// Opaque 20-character per-user credential carried in the announce URL path.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Passkey([u8; 20]);

impl Passkey {
    pub const LEN: usize = 20;

    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != Self::LEN {
            bail!("passkey must be exactly 20 characters, got {}", s.len());
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            bail!("passkey must be alphanumeric");
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(s.as_bytes());
        Ok(Self(buf))
    }

    /// Generate a fresh random passkey for a newly created user.
    pub fn generate() -> Self {
        let mut buf = [0u8; Self::LEN];
        let mut rng = rand::thread_rng();
        for b in &mut buf {
            *b = rng.sample(Alphanumeric);
        }
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        // Constructed from ASCII alphanumerics only
        std::str::from_utf8(&self.0).expect("passkey is ASCII")
    }
}

impl fmt::Display for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passkey({})", self.as_str())
    }
}

macro_rules! hex_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $ty::from_hex(&s).map_err(DeError::custom)
            }
        }
    };
}

hex_serde!(InfoHash);
hex_serde!(PeerID);
hex_serde!(PeerHash);

impl Serialize for Passkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Passkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Passkey::parse(&s).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_hex_roundtrip() {
        let hex = "0102030405060708090a0b0c0d0e0f1011121314";
        let ih = InfoHash::from_hex(hex).unwrap();
        assert_eq!(ih.to_string(), hex);
        assert_eq!(InfoHash::from_hex(&ih.to_string()).unwrap(), ih);
    }

    #[test]
    fn test_info_hash_rejects_bad_lengths() {
        assert!(InfoHash::from_hex("0102").is_err());
        assert!(InfoHash::from_bytes(&[0u8; 19]).is_err());
        assert!(InfoHash::from_bytes(&[0u8; 21]).is_err());
    }

    #[test]
    fn test_peer_hash_splits_back_into_parts() {
        let ih = InfoHash::from_bytes(&[1u8; 20]).unwrap();
        let pid = PeerID::from_bytes(&[2u8; 20]).unwrap();
        let ph = PeerHash::new(ih, pid);

        assert_eq!(ph.info_hash(), ih);
        assert_eq!(ph.peer_id(), pid);
        assert_eq!(ph.to_string().len(), 80);
    }

    #[test]
    fn test_peer_id_client_prefix() {
        let mut raw = [0u8; 20];
        raw[..8].copy_from_slice(b"-qB4500-");
        let pid = PeerID::from_bytes(&raw).unwrap();
        assert_eq!(pid.client_prefix(), "-qB4500-");
    }

    #[test]
    fn test_passkey_parse() {
        assert!(Passkey::parse("aaaaaaaaaaaaaaaaaaaa").is_ok());
        assert!(Passkey::parse("short").is_err());
        assert!(Passkey::parse("aaaaaaaaaaaaaaaaaaa!").is_err());
    }

    #[test]
    fn test_passkey_generate_is_valid() {
        let pk = Passkey::generate();
        assert_eq!(pk.as_str().len(), 20);
        assert!(Passkey::parse(pk.as_str()).is_ok());
    }
}
