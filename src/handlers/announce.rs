use axum::{
    extract::{ConnectInfo, Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::core::error::AnnounceError;
use crate::core::state::AppState;
use crate::metrics::collector::AnnStatus;
use crate::proto::ids::Passkey;
use crate::proto::response::{encode_reply, AnnounceReply};
use crate::tracker::announce::ClientInfo;
use crate::tracker::Settings;
use crate::validation::params::{is_non_routable, AnnounceParams};

/// GET /:passkey/announce
///
/// The transport shell around the announce engine: parse the raw query
/// (binary parameters percent-decoded by hand), resolve the client address,
/// run the engine, bencode the outcome. Tracker-level failures still leave
/// as HTTP 200.
pub async fn announce_handler(
    State(state): State<Arc<AppState>>,
    Path(passkey): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let started = Instant::now();
    let tracker = &state.tracker;

    tracker.metrics.record_announce();

    match handle(&state, &passkey, raw_query, &headers, addr).await {
        Ok(reply) => {
            tracker.metrics.record_status(AnnStatus::Ok);
            tracker
                .metrics
                .add_announce_time(started.elapsed().as_nanos() as i64);
            ok_response(&reply)
        }
        Err(error) => {
            if let Some(status) = status_of(&error) {
                tracker.metrics.record_status(status);
            }
            debug!(error = %error, "Announce rejected");
            error.into_response()
        }
    }
}

async fn handle(
    state: &AppState,
    passkey: &str,
    raw_query: Option<String>,
    headers: &HeaderMap,
    addr: SocketAddr,
) -> Result<AnnounceReply, AnnounceError> {
    let passkey = Passkey::parse(passkey).map_err(|_| AnnounceError::Unauthorized)?;

    let query = raw_query.ok_or(AnnounceError::Malformed)?;
    let request = AnnounceParams::parse_query(&query)
        .and_then(|params| params.validate())
        .map_err(|_| AnnounceError::Malformed)?;

    let ip = resolve_client_ip(&request, headers, addr.ip(), &state.tracker.settings)?;
    let agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    state
        .tracker
        .announce(&passkey, &request, &ClientInfo { ip, agent })
        .await
}

/// Which address the peer is reachable at.
///
/// Socket address first, overridden by X-Forwarded-For when a fronting
/// proxy is trusted, then by the explicit `ip`/`ipv6` parameters; when the
/// client supplies both families the configured preference picks one.
/// Non-routable results are rejected unless the tracker allows them.
fn resolve_client_ip(
    request: &crate::validation::params::AnnounceRequest,
    headers: &HeaderMap,
    socket_ip: IpAddr,
    settings: &Settings,
) -> Result<IpAddr, AnnounceError> {
    let mut ip = socket_ip;

    if settings.trust_forwarded.load(Ordering::Relaxed) {
        if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(first) = forwarded.split(',').next() {
                if let Ok(parsed) = first.trim().parse() {
                    ip = parsed;
                }
            }
        }
    }

    let prefer_v6 = settings.prefer_ipv6.load(Ordering::Relaxed);
    ip = match (request.ip, request.ipv6) {
        (Some(v4), Some(v6)) => {
            if prefer_v6 {
                v6
            } else {
                v4
            }
        }
        (Some(explicit), None) => explicit,
        (None, Some(explicit)) => explicit,
        (None, None) => ip,
    };

    if !settings.allow_non_routable.load(Ordering::Relaxed) && is_non_routable(&ip) {
        return Err(AnnounceError::Malformed);
    }

    Ok(ip)
}

fn ok_response(reply: &AnnounceReply) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .body(encode_reply(reply).into())
        .expect("static response construction")
}

fn status_of(error: &AnnounceError) -> Option<AnnStatus> {
    match error {
        AnnounceError::Unauthorized | AnnounceError::ClientNotAllowed => {
            Some(AnnStatus::Unauthorized)
        }
        AnnounceError::InvalidInfoHash => Some(AnnStatus::InvalidInfoHash),
        AnnounceError::Malformed | AnnounceError::NotSupported => Some(AnnStatus::Malformed),
        AnnounceError::TorrentDisabled(_)
        | AnnounceError::RequestTooFrequent
        | AnnounceError::Internal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::validation::params::AnnounceRequest;

    fn settings() -> Settings {
        let config: Config = toml::from_str("").unwrap();
        Settings::from_config(&config)
    }

    fn request(ip: Option<&str>, ipv6: Option<&str>) -> AnnounceRequest {
        use crate::proto::ids::{InfoHash, PeerID};
        AnnounceRequest {
            info_hash: InfoHash::from_bytes(&[1u8; 20]).unwrap(),
            peer_id: PeerID::from_bytes(b"-qB4500-abcdefghijkl").unwrap(),
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: None,
            numwant: None,
            compact: true,
            ip: ip.map(|s| s.parse().unwrap()),
            ipv6: ipv6.map(|s| s.parse().unwrap()),
            crypto_level: 0,
            paused: false,
        }
    }

    #[test]
    fn test_socket_ip_by_default() {
        let settings = settings();
        let ip = resolve_client_ip(
            &request(None, None),
            &HeaderMap::new(),
            "93.184.216.34".parse().unwrap(),
            &settings,
        )
        .unwrap();
        assert_eq!(ip, "93.184.216.34".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_explicit_ip_overrides_socket() {
        let settings = settings();
        let ip = resolve_client_ip(
            &request(Some("1.2.3.4"), None),
            &HeaderMap::new(),
            "93.184.216.34".parse().unwrap(),
            &settings,
        )
        .unwrap();
        assert_eq!(ip, "1.2.3.4".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_both_families_pick_v4_unless_configured() {
        let settings = settings();
        let ip = resolve_client_ip(
            &request(Some("1.2.3.4"), Some("2001:db8::1")),
            &HeaderMap::new(),
            "93.184.216.34".parse().unwrap(),
            &settings,
        )
        .unwrap();
        assert!(ip.is_ipv4());

        settings.prefer_ipv6.store(true, Ordering::Relaxed);
        let ip = resolve_client_ip(
            &request(Some("1.2.3.4"), Some("2001:db8::1")),
            &HeaderMap::new(),
            "93.184.216.34".parse().unwrap(),
            &settings,
        )
        .unwrap();
        assert!(ip.is_ipv6());
    }

    #[test]
    fn test_forwarded_header_needs_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());

        let settings = settings();
        let ip = resolve_client_ip(
            &request(None, None),
            &headers,
            "93.184.216.34".parse().unwrap(),
            &settings,
        )
        .unwrap();
        assert_eq!(ip, "93.184.216.34".parse::<IpAddr>().unwrap());

        settings.trust_forwarded.store(true, Ordering::Relaxed);
        let ip = resolve_client_ip(
            &request(None, None),
            &headers,
            "93.184.216.34".parse().unwrap(),
            &settings,
        )
        .unwrap();
        assert_eq!(ip, "1.2.3.4".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_non_routable_rejected_by_default() {
        let settings = settings();
        let result = resolve_client_ip(
            &request(None, None),
            &HeaderMap::new(),
            "192.168.1.50".parse().unwrap(),
            &settings,
        );
        assert!(matches!(result, Err(AnnounceError::Malformed)));

        settings.allow_non_routable.store(true, Ordering::Relaxed);
        let ip = resolve_client_ip(
            &request(None, None),
            &HeaderMap::new(),
            "192.168.1.50".parse().unwrap(),
            &settings,
        )
        .unwrap();
        assert_eq!(ip, "192.168.1.50".parse::<IpAddr>().unwrap());
    }
}
