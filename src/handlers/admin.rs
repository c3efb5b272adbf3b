use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::AdminError;
use crate::core::state::AppState;
use crate::models::admin::{
    ConfigUpdateRequest, ConfigView, PingRequest, PingResponse, StatusResp, TorrentAddRequest,
    TorrentUpdateRequest, UserAddRequest, UserAddResponse, UserUpdateRequest,
};
use crate::models::torrent::Torrent;
use crate::models::user::User;
use crate::models::whitelist::WhiteListClient;
use crate::proto::ids::{InfoHash, Passkey};
use crate::utils::auth::verify_api_key;

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AdminError> {
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if verify_api_key(provided, &state.config.store.api_key) {
        Ok(())
    } else {
        warn!("Unauthorized admin request");
        Err(AdminError::Unauthorized)
    }
}

fn info_hash_from_hex(hex: &str) -> Result<InfoHash, AdminError> {
    InfoHash::from_hex(hex).map_err(|e| AdminError::BadRequest(e.to_string()))
}

/// POST /torrent
pub async fn torrent_add_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<TorrentAddRequest>,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    let info_hash = info_hash_from_hex(&request.info_hash)?;

    let mut torrent = Torrent::new(info_hash, &request.release_name);
    // Negative multipliers are clamped rather than rejected
    torrent.multi_up = request.multi_up.unwrap_or(1.0).max(0.0);
    torrent.multi_dn = request.multi_dn.unwrap_or(1.0).max(0.0);

    state
        .tracker
        .store
        .torrent_add(torrent)
        .await
        .map_err(|e| AdminError::from_store(e, "Torrent"))?;

    info!(info_hash = %info_hash, "Torrent added");
    Ok(Json(StatusResp::message("Torrent added successfully")))
}

/// PATCH /torrent/:info_hash
pub async fn torrent_update_handler(
    State(state): State<Arc<AppState>>,
    Path(info_hash_hex): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TorrentUpdateRequest>,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    if request.update_keys.is_empty() {
        return Err(AdminError::BadRequest("no update keys specified".to_string()));
    }

    let info_hash = info_hash_from_hex(&info_hash_hex)?;

    // Deleted torrents stay reachable here so they can be un-deleted
    let mut torrent = state
        .tracker
        .store
        .torrent_by_info_hash(&info_hash, true)
        .await
        .map_err(|e| AdminError::from_store(e, "Torrent"))?;

    for key in &request.update_keys {
        match key.as_str() {
            "release_name" => torrent.release_name = request.release_name.clone(),
            "is_deleted" => torrent.is_deleted = request.is_deleted,
            "is_enabled" => torrent.is_enabled = request.is_enabled,
            "reason" => torrent.reason = request.reason.clone(),
            "multi_up" => torrent.multi_up = request.multi_up.max(0.0),
            "multi_dn" => torrent.multi_dn = request.multi_dn.max(0.0),
            other => {
                return Err(AdminError::BadRequest(format!("unknown update key '{}'", other)))
            }
        }
    }

    state
        .tracker
        .store
        .torrent_update(torrent.clone())
        .await
        .map_err(|e| AdminError::from_store(e, "Torrent"))?;

    if torrent.is_deleted {
        // Deleting a torrent destroys its swarm and every peer in it
        state.tracker.swarms.remove(&info_hash);
    } else if let Some(swarm) = state.tracker.swarms.get(&info_hash) {
        swarm.with_torrent_mut(|meta| {
            meta.release_name = torrent.release_name.clone();
            meta.is_deleted = torrent.is_deleted;
            meta.is_enabled = torrent.is_enabled;
            meta.reason = torrent.reason.clone();
            meta.multi_up = torrent.multi_up;
            meta.multi_dn = torrent.multi_dn;
        });
    }

    info!(info_hash = %info_hash, keys = ?request.update_keys, "Torrent updated");
    Ok(Json(StatusResp::message("Updated successfully")))
}

/// DELETE /torrent/:info_hash
pub async fn torrent_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(info_hash_hex): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    let info_hash = info_hash_from_hex(&info_hash_hex)?;

    state
        .tracker
        .store
        .torrent_delete(&info_hash)
        .await
        .map_err(|e| AdminError::from_store(e, "Torrent"))?;

    state.tracker.swarms.remove(&info_hash);

    info!(info_hash = %info_hash, "Torrent deleted");
    Ok(Json(StatusResp::message("Deleted successfully")))
}

/// POST /user
pub async fn user_add_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UserAddRequest>,
) -> Result<Json<UserAddResponse>, AdminError> {
    authorize(&state, &headers)?;

    let passkey = match &request.passkey {
        Some(raw) => Passkey::parse(raw).map_err(|e| AdminError::BadRequest(e.to_string()))?,
        None => Passkey::generate(),
    };

    let mut user = User::new(request.user_id, passkey);
    user.download_enabled = request.download_enabled;

    state
        .tracker
        .store
        .user_add(user)
        .await
        .map_err(|e| AdminError::from_store(e, "User"))?;

    info!(user_id = request.user_id, "User added");
    Ok(Json(UserAddResponse {
        user_id: request.user_id,
        passkey: passkey.to_string(),
    }))
}

/// PATCH /user/pk/:passkey
pub async fn user_update_handler(
    State(state): State<Arc<AppState>>,
    Path(passkey): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UserUpdateRequest>,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    if request.update_keys.is_empty() {
        return Err(AdminError::BadRequest("no update keys specified".to_string()));
    }

    let passkey = Passkey::parse(&passkey).map_err(|e| AdminError::BadRequest(e.to_string()))?;

    let mut user = state
        .tracker
        .store
        .user_by_passkey(&passkey)
        .await
        .map_err(|e| AdminError::from_store(e, "User"))?;

    for key in &request.update_keys {
        match key.as_str() {
            "download_enabled" => user.download_enabled = request.download_enabled,
            "is_deleted" => user.is_deleted = request.is_deleted,
            other => {
                return Err(AdminError::BadRequest(format!("unknown update key '{}'", other)))
            }
        }
    }

    state
        .tracker
        .store
        .user_update(&passkey, user)
        .await
        .map_err(|e| AdminError::from_store(e, "User"))?;

    // Next announce re-reads the store
    state.tracker.users.invalidate(&passkey);

    info!(keys = ?request.update_keys, "User updated");
    Ok(Json(StatusResp::message("Updated successfully")))
}

/// DELETE /user/pk/:passkey
pub async fn user_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(passkey): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    let passkey = Passkey::parse(&passkey).map_err(|e| AdminError::BadRequest(e.to_string()))?;

    state
        .tracker
        .store
        .user_delete(&passkey)
        .await
        .map_err(|e| AdminError::from_store(e, "User"))?;

    state.tracker.users.invalidate(&passkey);

    info!("User deleted");
    Ok(Json(StatusResp::message("Deleted user successfully")))
}

/// GET /whitelist
pub async fn whitelist_get_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<WhiteListClient>>, AdminError> {
    authorize(&state, &headers)?;

    let mut clients: Vec<WhiteListClient> = state
        .tracker
        .whitelist
        .snapshot()
        .values()
        .cloned()
        .collect();
    clients.sort_by(|a, b| a.client_prefix.cmp(&b.client_prefix));

    Ok(Json(clients))
}

/// POST /whitelist
pub async fn whitelist_add_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(client): Json<WhiteListClient>,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    if client.client_prefix.is_empty() || client.client_name.is_empty() {
        return Err(AdminError::BadRequest(
            "client_prefix and client_name are required".to_string(),
        ));
    }

    state
        .tracker
        .store
        .whitelist_add(client.clone())
        .await
        .map_err(|e| AdminError::from_store(e, "Whitelist entry"))?;

    reload_whitelist(&state).await?;

    info!(prefix = %client.client_prefix, client = %client.client_name, "Whitelist entry added");
    Ok(Json(StatusResp::message("Whitelist entry added successfully")))
}

/// DELETE /whitelist/:prefix
pub async fn whitelist_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(prefix): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    state
        .tracker
        .store
        .whitelist_delete(&prefix)
        .await
        .map_err(|e| AdminError::from_store(e, "Whitelist entry"))?;

    reload_whitelist(&state).await?;

    info!(prefix = %prefix, "Whitelist entry deleted");
    Ok(Json(StatusResp::message("Whitelist entry deleted successfully")))
}

/// The gate always reflects the store after a mutation; readers swap to the
/// rebuilt snapshot atomically.
async fn reload_whitelist(state: &AppState) -> Result<(), AdminError> {
    let clients = state
        .tracker
        .store
        .whitelist_get_all()
        .await
        .map_err(|e| AdminError::from_store(e, "Whitelist"))?;
    state.tracker.whitelist.replace(clients);
    Ok(())
}

/// GET /config
pub async fn config_get_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ConfigView>, AdminError> {
    authorize(&state, &headers)?;

    let settings = &state.tracker.settings;
    Ok(Json(ConfigView {
        tracker_announce_interval: settings.announce_interval.load(Ordering::Relaxed),
        tracker_announce_interval_min: settings.announce_interval_min.load(Ordering::Relaxed),
        tracker_reaper_interval: settings.reaper_interval.load(Ordering::Relaxed),
        tracker_batch_update_interval: settings.batch_update_interval.load(Ordering::Relaxed),
        tracker_max_peers: settings.max_peers.load(Ordering::Relaxed),
        tracker_auto_register: settings.auto_register.load(Ordering::Relaxed),
        tracker_allow_non_routable: settings.allow_non_routable.load(Ordering::Relaxed),
        geodb_enabled: settings.geodb_enabled.load(Ordering::Relaxed),
    }))
}

/// PATCH /config
pub async fn config_update_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ConfigUpdateRequest>,
) -> Result<Json<StatusResp>, AdminError> {
    authorize(&state, &headers)?;

    if request.update_keys.is_empty() {
        return Err(AdminError::BadRequest("no update keys specified".to_string()));
    }

    let settings = &state.tracker.settings;

    for key in &request.update_keys {
        match key.as_str() {
            "tracker_announce_interval" => {
                let value = nonzero(request.tracker_announce_interval, key)?;
                settings.announce_interval.store(value, Ordering::Relaxed);
            }
            "tracker_announce_interval_min" => {
                let value = nonzero(request.tracker_announce_interval_min, key)?;
                settings.announce_interval_min.store(value, Ordering::Relaxed);
            }
            "tracker_reaper_interval" => {
                let value = nonzero(request.tracker_reaper_interval, key)?;
                settings.reaper_interval.store(value, Ordering::Relaxed);
            }
            "tracker_batch_update_interval" => {
                let value = nonzero(request.tracker_batch_update_interval, key)?;
                settings.batch_update_interval.store(value, Ordering::Relaxed);
            }
            "tracker_max_peers" => {
                let value = nonzero(request.tracker_max_peers, key)?;
                settings.max_peers.store(value, Ordering::Relaxed);
            }
            "tracker_auto_register" => {
                settings
                    .auto_register
                    .store(request.tracker_auto_register, Ordering::Relaxed);
            }
            "tracker_allow_non_routable" => {
                settings
                    .allow_non_routable
                    .store(request.tracker_allow_non_routable, Ordering::Relaxed);
            }
            "geodb_enabled" => {
                settings
                    .geodb_enabled
                    .store(request.geodb_enabled, Ordering::Relaxed);
            }
            other => {
                return Err(AdminError::BadRequest(format!("unknown update key '{}'", other)))
            }
        }
    }

    info!(keys = ?request.update_keys, "Config values updated");
    Ok(Json(StatusResp::message("Config values updated")))
}

fn nonzero(value: u32, key: &str) -> Result<u32, AdminError> {
    if value == 0 {
        Err(AdminError::BadRequest(format!("{} must be greater than 0", key)))
    } else {
        Ok(value)
    }
}

/// POST /ping
pub async fn ping_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PingRequest>,
) -> Result<Json<PingResponse>, AdminError> {
    authorize(&state, &headers)?;
    Ok(Json(PingResponse { pong: request.ping }))
}
