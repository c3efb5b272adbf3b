// Application state shared by every handler

use anyhow::Result;
use std::sync::Arc;

use crate::core::config::Config;
use crate::db::http::HttpStore;
use crate::db::memory::MemoryStore;
use crate::db::Store;
use crate::geo::{DummyProvider, GeoProvider};
use crate::tracker::Tracker;

/// Everything a request handler can reach: the tracker core plus the static
/// configuration. Cloning is cheap; both members are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state with the store driver selected by config. Geolocation
    /// starts with the dummy provider; a real provider implements
    /// [`GeoProvider`] and is injected through [`AppState::with_parts`].
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = match config.store.driver.as_str() {
            "http" => Arc::new(HttpStore::new(&config.store.endpoint, &config.store.api_key)?),
            _ => Arc::new(MemoryStore::new()),
        };

        Ok(Self::with_parts(config, store, Arc::new(DummyProvider)))
    }

    pub fn with_parts(config: Config, store: Arc<dyn Store>, geo: Arc<dyn GeoProvider>) -> Self {
        let tracker = Tracker::new(&config, store, geo);
        Self {
            tracker: Arc::new(tracker),
            config: Arc::new(config),
        }
    }
}
