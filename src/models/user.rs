use serde::{Deserialize, Serialize};

use crate::proto::ids::Passkey;

/// A user known to the tracker.
///
/// Deleted users are soft-removed: lookups treat them as gone but their
/// counters survive until an operator purges the row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub user_id: u32,
    pub passkey: Passkey,
    #[serde(default = "default_download_enabled")]
    pub download_enabled: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub downloaded: u64,
    #[serde(default)]
    pub uploaded: u64,
    #[serde(default)]
    pub announces: u32,
}

fn default_download_enabled() -> bool {
    true
}

impl User {
    pub fn new(user_id: u32, passkey: Passkey) -> Self {
        Self {
            user_id,
            passkey,
            download_enabled: true,
            is_deleted: false,
            downloaded: 0,
            uploaded: 0,
            announces: 0,
        }
    }

    /// The `Passkey` type cannot be empty, so validity reduces to the
    /// deletion flag.
    pub fn valid(&self) -> bool {
        !self.is_deleted
    }
}
