use std::net::IpAddr;

/// Location and network-owner attributes attached to a peer when it first
/// joins a swarm.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoInfo {
    pub country_code: String,
    pub asn: u32,
    pub as_name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Pluggable IP geolocation. Consulted once per peer, at creation; never on
/// subsequent announces.
pub trait GeoProvider: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<GeoInfo>;
}

/// Provider installed when geolocation is disabled.
#[derive(Debug, Default)]
pub struct DummyProvider;

impl GeoProvider for DummyProvider {
    fn lookup(&self, _ip: IpAddr) -> Option<GeoInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_dummy_provider_returns_none() {
        let provider = DummyProvider;
        assert_eq!(
            provider.lookup(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))),
            None
        );
    }
}
