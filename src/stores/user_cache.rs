use dashmap::DashMap;
use std::sync::Arc;

use crate::models::user::User;
use crate::proto::ids::Passkey;

/// In-memory cache of users keyed by passkey, filled lazily from the store
/// on announce and kept for the life of the process. Admin mutations
/// invalidate entries so the next announce re-reads the store.
pub struct UserCache {
    users: DashMap<Passkey, Arc<User>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    pub fn get(&self, passkey: &Passkey) -> Option<Arc<User>> {
        self.users.get(passkey).map(|entry| Arc::clone(&entry))
    }

    pub fn insert(&self, user: User) -> Arc<User> {
        let user = Arc::new(user);
        self.users.insert(user.passkey, Arc::clone(&user));
        user
    }

    pub fn invalidate(&self, passkey: &Passkey) -> Option<Arc<User>> {
        self.users.remove(passkey).map(|(_, user)| user)
    }

    pub fn clear(&self) {
        self.users.clear();
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for UserCache {
    fn default() -> Self {
        Self::new()
    }
}
