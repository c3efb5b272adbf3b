use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;

use super::{PeerStatsDelta, Store, StoreError, StoreResult, TorrentStatsDelta, UserStatsDelta};
use crate::models::peer::Peer;
use crate::models::torrent::Torrent;
use crate::models::user::User;
use crate::models::whitelist::WhiteListClient;
use crate::proto::ids::{InfoHash, Passkey, PeerID};

/// Store driver backed by an upstream backend API speaking the same JSON
/// entity shapes as the admin surface.
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpStore {
    pub fn new(endpoint: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.endpoint, path))
            .query(&[("api_key", self.api_key.as_str())])
    }

    fn check(response: Response) -> StoreResult<Response> {
        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            StatusCode::CONFLICT => Err(StoreError::Duplicate),
            s => Err(StoreError::Backend(anyhow!(
                "backend returned status {}",
                s
            ))),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        let response = builder
            .send()
            .await
            .context("Failed to reach backend store")?;
        Self::check(response)
    }

    async fn send_ok(&self, builder: RequestBuilder) -> StoreResult<()> {
        self.send(builder).await.map(|_| ())
    }
}

#[async_trait]
impl Store for HttpStore {
    async fn user_by_passkey(&self, passkey: &Passkey) -> StoreResult<User> {
        let response = self
            .send(self.request(Method::GET, &format!("/user/pk/{}", passkey)))
            .await?;
        let user: User = response
            .json()
            .await
            .context("Failed to parse user from backend")?;
        if !user.valid() {
            return Err(StoreError::NotFound);
        }
        Ok(user)
    }

    async fn user_add(&self, user: User) -> StoreResult<()> {
        self.send_ok(self.request(Method::POST, "/user").json(&user))
            .await
    }

    async fn user_update(&self, passkey: &Passkey, user: User) -> StoreResult<()> {
        self.send_ok(
            self.request(Method::PATCH, &format!("/user/pk/{}", passkey))
                .json(&user),
        )
        .await
    }

    async fn user_delete(&self, passkey: &Passkey) -> StoreResult<()> {
        self.send_ok(self.request(Method::DELETE, &format!("/user/pk/{}", passkey)))
            .await
    }

    async fn user_update_stats(&self, deltas: Vec<UserStatsDelta>) -> StoreResult<()> {
        self.send_ok(self.request(Method::POST, "/user_stats").json(&deltas))
            .await
    }

    async fn torrent_by_info_hash(
        &self,
        info_hash: &InfoHash,
        include_deleted: bool,
    ) -> StoreResult<Torrent> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/torrent/{}", info_hash))
                    .query(&[("include_deleted", include_deleted)]),
            )
            .await?;
        let torrent = response
            .json()
            .await
            .context("Failed to parse torrent from backend")?;
        Ok(torrent)
    }

    async fn torrent_add(&self, torrent: Torrent) -> StoreResult<()> {
        self.send_ok(self.request(Method::POST, "/torrent").json(&torrent))
            .await
    }

    async fn torrent_update(&self, torrent: Torrent) -> StoreResult<()> {
        self.send_ok(
            self.request(Method::PATCH, &format!("/torrent/{}", torrent.info_hash))
                .json(&torrent),
        )
        .await
    }

    async fn torrent_delete(&self, info_hash: &InfoHash) -> StoreResult<()> {
        self.send_ok(self.request(Method::DELETE, &format!("/torrent/{}", info_hash)))
            .await
    }

    async fn torrent_update_stats(&self, deltas: Vec<TorrentStatsDelta>) -> StoreResult<()> {
        self.send_ok(self.request(Method::POST, "/torrent_stats").json(&deltas))
            .await
    }

    async fn peer_add(&self, info_hash: &InfoHash, peer: Peer) -> StoreResult<()> {
        self.send_ok(
            self.request(Method::POST, &format!("/peers/{}", info_hash))
                .json(&peer),
        )
        .await
    }

    async fn peer_delete(&self, info_hash: &InfoHash, peer_id: &PeerID) -> StoreResult<()> {
        self.send_ok(self.request(Method::DELETE, &format!("/peers/{}/{}", info_hash, peer_id)))
            .await
    }

    async fn peer_reap(&self, before_ts: i64) -> StoreResult<u64> {
        let response = self
            .send(
                self.request(Method::DELETE, "/peers")
                    .query(&[("before", before_ts)]),
            )
            .await?;
        let reaped: u64 = response
            .json()
            .await
            .context("Failed to parse reap count from backend")?;
        Ok(reaped)
    }

    async fn peer_update_stats(&self, deltas: Vec<PeerStatsDelta>) -> StoreResult<()> {
        self.send_ok(self.request(Method::POST, "/peer_stats").json(&deltas))
            .await
    }

    async fn whitelist_get_all(&self) -> StoreResult<Vec<WhiteListClient>> {
        let response = self.send(self.request(Method::GET, "/whitelist")).await?;
        let clients = response
            .json()
            .await
            .context("Failed to parse whitelist from backend")?;
        Ok(clients)
    }

    async fn whitelist_add(&self, client: WhiteListClient) -> StoreResult<()> {
        self.send_ok(self.request(Method::POST, "/whitelist").json(&client))
            .await
    }

    async fn whitelist_delete(&self, client_prefix: &str) -> StoreResult<()> {
        self.send_ok(self.request(Method::DELETE, &format!("/whitelist/{}", client_prefix)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_store_creation_normalizes_endpoint() {
        let store = HttpStore::new("http://localhost:8000/api/", "key").unwrap();
        assert_eq!(store.endpoint, "http://localhost:8000/api");
    }
}
