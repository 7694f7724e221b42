//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server endpoint. When routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// GET /
    pub async fn home(&self) -> Response {
        self.client
            .get(&self.base_url)
            .send()
            .await
            .expect("Home request failed")
    }

    // ========================================================================
    // User Endpoints
    // ========================================================================

    /// POST /v1/users
    pub async fn create_user(&self, name: &str, email: Option<&str>) -> Response {
        self.client
            .post(format!("{}/v1/users", self.base_url))
            .json(&json!({ "name": name, "email": email }))
            .send()
            .await
            .expect("Create user request failed")
    }

    /// POST /v1/users with a caller-chosen id
    pub async fn create_user_with_id(&self, id: &str, name: &str) -> Response {
        self.client
            .post(format!("{}/v1/users", self.base_url))
            .json(&json!({ "id": id, "name": name }))
            .send()
            .await
            .expect("Create user request failed")
    }

    /// GET /v1/users
    pub async fn list_users(&self) -> Response {
        self.client
            .get(format!("{}/v1/users", self.base_url))
            .send()
            .await
            .expect("List users request failed")
    }

    /// GET /v1/users/{user_id}
    pub async fn get_user(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/users/{}", self.base_url, user_id))
            .send()
            .await
            .expect("Get user request failed")
    }

    /// PUT /v1/users/{user_id}
    pub async fn update_user(&self, user_id: &str, name: &str, email: Option<&str>) -> Response {
        self.client
            .put(format!("{}/v1/users/{}", self.base_url, user_id))
            .json(&json!({ "name": name, "email": email }))
            .send()
            .await
            .expect("Update user request failed")
    }

    /// DELETE /v1/users/{user_id}
    pub async fn delete_user(&self, user_id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/users/{}", self.base_url, user_id))
            .send()
            .await
            .expect("Delete user request failed")
    }

    // ========================================================================
    // Source (Spotify) Auth Endpoints
    // ========================================================================

    /// GET /v1/spotify/login/{user_id}
    pub async fn spotify_login(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/spotify/login/{}", self.base_url, user_id))
            .send()
            .await
            .expect("Spotify login request failed")
    }

    /// POST /v1/spotify/callback
    pub async fn spotify_callback(&self, user_id: &str, code: &str) -> Response {
        self.client
            .post(format!("{}/v1/spotify/callback", self.base_url))
            .json(&json!({ "user_id": user_id, "code": code }))
            .send()
            .await
            .expect("Spotify callback request failed")
    }

    /// GET /v1/spotify/logged-in/{user_id}
    pub async fn spotify_logged_in(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/spotify/logged-in/{}", self.base_url, user_id))
            .send()
            .await
            .expect("Spotify logged-in request failed")
    }

    /// GET /v1/spotify/playlists/{user_id}
    pub async fn spotify_playlists(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/spotify/playlists/{}", self.base_url, user_id))
            .send()
            .await
            .expect("Spotify playlists request failed")
    }

    // ========================================================================
    // Destination (YouTube Music) Auth Endpoints
    // ========================================================================

    /// GET /v1/ytmusic/login/{user_id}
    pub async fn ytmusic_login(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/ytmusic/login/{}", self.base_url, user_id))
            .send()
            .await
            .expect("YtMusic login request failed")
    }

    /// POST /v1/ytmusic/poll-token
    pub async fn ytmusic_poll_token(&self, user_id: &str, device_code: &str) -> Response {
        self.client
            .post(format!("{}/v1/ytmusic/poll-token", self.base_url))
            .json(&json!({ "user_id": user_id, "device_code": device_code }))
            .send()
            .await
            .expect("YtMusic poll-token request failed")
    }

    /// GET /v1/ytmusic/logged-in/{user_id}
    pub async fn ytmusic_logged_in(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/ytmusic/logged-in/{}", self.base_url, user_id))
            .send()
            .await
            .expect("YtMusic logged-in request failed")
    }

    // ========================================================================
    // Transfer Endpoints
    // ========================================================================

    /// POST /v1/transfer/start
    pub async fn transfer_start(&self, user_id: &str, playlist_ids: &[&str]) -> Response {
        self.client
            .post(format!("{}/v1/transfer/start", self.base_url))
            .json(&json!({ "user_id": user_id, "playlist_ids": playlist_ids }))
            .send()
            .await
            .expect("Transfer start request failed")
    }

    /// POST /v1/transfer/status
    pub async fn transfer_status(&self, user_id: &str, transfer_id: &str) -> Response {
        self.client
            .post(format!("{}/v1/transfer/status", self.base_url))
            .json(&json!({ "user_id": user_id, "transfer_id": transfer_id }))
            .send()
            .await
            .expect("Transfer status request failed")
    }
}
