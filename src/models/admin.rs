use serde::{Deserialize, Serialize};

/// Generic admin response; exactly one of the fields is set.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct StatusResp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResp {
    pub fn message(msg: &str) -> Self {
        Self {
            error: None,
            message: Some(msg.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TorrentAddRequest {
    /// Hex-encoded info hash.
    pub info_hash: String,
    #[serde(default)]
    pub release_name: String,
    pub multi_up: Option<f64>,
    pub multi_dn: Option<f64>,
}

/// Field-list update for a torrent: only the keys named in `update_keys`
/// are applied, so valid zero/false values are expressible.
#[derive(Debug, Deserialize)]
pub struct TorrentUpdateRequest {
    pub update_keys: Vec<String>,
    #[serde(default)]
    pub release_name: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub multi_up: f64,
    #[serde(default)]
    pub multi_dn: f64,
}

#[derive(Debug, Deserialize)]
pub struct UserAddRequest {
    pub user_id: u32,
    /// Generated server-side when absent.
    pub passkey: Option<String>,
    #[serde(default = "default_true")]
    pub download_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct UserAddResponse {
    pub user_id: u32,
    pub passkey: String,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    pub update_keys: Vec<String>,
    #[serde(default)]
    pub download_enabled: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

fn default_true() -> bool {
    true
}

/// Live tracker configuration as seen and patched over the admin surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigView {
    pub tracker_announce_interval: u32,
    pub tracker_announce_interval_min: u32,
    pub tracker_reaper_interval: u32,
    pub tracker_batch_update_interval: u32,
    pub tracker_max_peers: u32,
    pub tracker_auto_register: bool,
    pub tracker_allow_non_routable: bool,
    pub geodb_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdateRequest {
    pub update_keys: Vec<String>,
    #[serde(default)]
    pub tracker_announce_interval: u32,
    #[serde(default)]
    pub tracker_announce_interval_min: u32,
    #[serde(default)]
    pub tracker_reaper_interval: u32,
    #[serde(default)]
    pub tracker_batch_update_interval: u32,
    #[serde(default)]
    pub tracker_max_peers: u32,
    #[serde(default)]
    pub tracker_auto_register: bool,
    #[serde(default)]
    pub tracker_allow_non_routable: bool,
    #[serde(default)]
    pub geodb_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PingRequest {
    pub ping: String,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub pong: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_resp_omits_empty_fields() {
        let json = serde_json::to_string(&StatusResp::message("ok")).unwrap();
        assert_eq!(json, r#"{"message":"ok"}"#);
    }

    #[test]
    fn test_torrent_update_defaults() {
        let request: TorrentUpdateRequest = serde_json::from_str(
            r#"{"update_keys": ["is_enabled", "reason"], "is_enabled": false, "reason": "retired"}"#,
        )
        .unwrap();

        assert_eq!(request.update_keys, vec!["is_enabled", "reason"]);
        assert!(!request.is_enabled);
        assert_eq!(request.reason, "retired");
        // Unnamed fields deserialize to defaults and are ignored by handlers
        assert_eq!(request.multi_up, 0.0);
    }

    #[test]
    fn test_user_add_defaults_to_download_enabled() {
        let request: UserAddRequest =
            serde_json::from_str(r#"{"user_id": 42}"#).unwrap();
        assert_eq!(request.user_id, 42);
        assert!(request.passkey.is_none());
        assert!(request.download_enabled);
    }
}
