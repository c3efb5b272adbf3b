pub mod announce;
pub mod batch;
pub mod reaper;

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::core::config::Config;
use crate::db::Store;
use crate::geo::GeoProvider;
use crate::metrics::collector::Metrics;
use crate::stores::swarm_index::SwarmIndex;
use crate::stores::user_cache::UserCache;
use crate::stores::whitelist::Whitelist;
use batch::BatchWriter;

/// Admin-mutable runtime settings. Kept as atomics so the announce path and
/// the periodic tasks read them without any lock; the rare admin PATCH just
/// stores new values.
pub struct Settings {
    pub public: AtomicBool,
    pub announce_interval: AtomicU32,
    pub announce_interval_min: AtomicU32,
    pub reaper_interval: AtomicU32,
    pub batch_update_interval: AtomicU32,
    pub max_peers: AtomicU32,
    pub auto_register: AtomicBool,
    pub allow_non_routable: AtomicBool,
    pub trust_forwarded: AtomicBool,
    pub prefer_ipv6: AtomicBool,
    pub hnr_threshold: AtomicU32,
    pub geodb_enabled: AtomicBool,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let t = &config.tracker;
        Self {
            public: AtomicBool::new(t.public),
            announce_interval: AtomicU32::new(t.announce_interval),
            announce_interval_min: AtomicU32::new(t.announce_interval_min),
            reaper_interval: AtomicU32::new(t.reaper_interval),
            batch_update_interval: AtomicU32::new(t.batch_update_interval),
            max_peers: AtomicU32::new(t.max_peers),
            auto_register: AtomicBool::new(t.auto_register),
            allow_non_routable: AtomicBool::new(t.allow_non_routable),
            trust_forwarded: AtomicBool::new(t.trust_forwarded),
            prefer_ipv6: AtomicBool::new(t.ipv6_only),
            hnr_threshold: AtomicU32::new(t.hnr_threshold),
            geodb_enabled: AtomicBool::new(config.geo.enabled),
        }
    }

    /// Seconds a peer may stay silent before the reaper evicts it: two
    /// announce intervals.
    pub fn peer_ttl(&self) -> i64 {
        i64::from(self.announce_interval.load(Ordering::Relaxed)) * 2
    }
}

/// The tracker core: swarm index, caches, gates, counters and the handles
/// periodic tasks drain. One value owns all announce-path state so handlers
/// and tests stay hermetic.
pub struct Tracker {
    pub swarms: SwarmIndex,
    pub users: UserCache,
    pub whitelist: Whitelist,
    pub metrics: Metrics,
    pub batch: BatchWriter,
    pub store: Arc<dyn Store>,
    pub geo: Arc<dyn GeoProvider>,
    pub settings: Settings,
}

impl Tracker {
    pub fn new(config: &Config, store: Arc<dyn Store>, geo: Arc<dyn GeoProvider>) -> Self {
        Self {
            swarms: SwarmIndex::new(),
            users: UserCache::new(),
            whitelist: Whitelist::new(),
            metrics: Metrics::new(),
            batch: BatchWriter::new(),
            store,
            geo,
            settings: Settings::from_config(config),
        }
    }

    /// Load store-backed state the gate needs before serving: the client
    /// whitelist.
    pub async fn hydrate(&self) -> Result<()> {
        let clients = self
            .store
            .whitelist_get_all()
            .await
            .context("Failed to load client whitelist from store")?;

        let count = clients.len();
        self.whitelist.replace(clients);

        info!(clients = count, "Client whitelist hydrated");
        Ok(())
    }

    /// Drain the accumulated stat deltas into the store.
    pub async fn flush_stats(&self) -> bool {
        self.batch.flush(self.store.as_ref(), &self.metrics).await
    }
}
