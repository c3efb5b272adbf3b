use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::whitelist::WhiteListClient;
use crate::proto::ids::PeerID;

/// Copy-on-write client whitelist.
///
/// The announce path clones an `Arc` snapshot and scans it without holding
/// any lock; admin mutations build a fresh map and swap it in. An empty set
/// rejects every client, which is the safe default for a private tracker;
/// public mode bypasses the gate in the engine.
pub struct Whitelist {
    inner: RwLock<Arc<HashMap<String, WhiteListClient>>>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, WhiteListClient>> {
        Arc::clone(&self.inner.read().expect("whitelist lock poisoned"))
    }

    /// Install a new client set wholesale, e.g. after hydrating from the
    /// store or after an admin mutation.
    pub fn replace(&self, clients: Vec<WhiteListClient>) {
        let map: HashMap<String, WhiteListClient> = clients
            .into_iter()
            .map(|c| (c.client_prefix.clone(), c))
            .collect();
        *self.inner.write().expect("whitelist lock poisoned") = Arc::new(map);
    }

    /// True when the peer id starts with any whitelisted client prefix.
    pub fn permitted(&self, peer_id: &PeerID) -> bool {
        self.snapshot().values().any(|c| c.matches(peer_id))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::new()
    }
}
