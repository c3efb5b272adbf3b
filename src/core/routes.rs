// HTTP routes configuration

use crate::core::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Client-facing announce path; the passkey rides in the URL
        .route(
            "/:passkey/announce",
            get(crate::handlers::announce::announce_handler),
        )
        // Admin surface (requires API key)
        .route("/metrics", get(crate::handlers::metrics::metrics_handler))
        .route("/ping", post(crate::handlers::admin::ping_handler))
        .route(
            "/config",
            get(crate::handlers::admin::config_get_handler)
                .patch(crate::handlers::admin::config_update_handler),
        )
        .route("/torrent", post(crate::handlers::admin::torrent_add_handler))
        .route(
            "/torrent/:info_hash",
            delete(crate::handlers::admin::torrent_delete_handler)
                .patch(crate::handlers::admin::torrent_update_handler),
        )
        .route("/user", post(crate::handlers::admin::user_add_handler))
        .route(
            "/user/pk/:passkey",
            delete(crate::handlers::admin::user_delete_handler)
                .patch(crate::handlers::admin::user_update_handler),
        )
        .route(
            "/whitelist",
            get(crate::handlers::admin::whitelist_get_handler)
                .post(crate::handlers::admin::whitelist_add_handler),
        )
        .route(
            "/whitelist/:prefix",
            delete(crate::handlers::admin::whitelist_delete_handler),
        )
        .fallback(crate::handlers::fallback::fallback_handler)
        .with_state(state)
}
