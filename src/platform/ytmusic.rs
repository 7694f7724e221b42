//! YouTube Music client (destination platform).
//!
//! Authentication uses Google's OAuth device-code flow; catalog access goes
//! through the YouTube Data API v3 (search, playlists, playlistItems).

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{
    error_from_response, transport_error, DestinationPlatform, DeviceAuthorization,
    DevicePollResult, PlatformError, PlatformKind, SearchHit, TokenSet,
};
use crate::config::PlatformCredentials;

const OAUTH_BASE_URL: &str = "https://oauth2.googleapis.com";
const API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

// Category 10 is "Music" on every YouTube locale.
const MUSIC_CATEGORY_ID: &str = "10";

pub struct YtMusicClient {
    http: reqwest::Client,
    credentials: PlatformCredentials,
    search_max_results: u32,
    oauth_base_url: String,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_url: String,
    interval: u64,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    title: String,
    #[serde(rename = "channelTitle")]
    channel_title: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistInsertResponse {
    id: String,
}

impl YtMusicClient {
    pub fn new(
        credentials: PlatformCredentials,
        search_max_results: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials,
            search_max_results,
            oauth_base_url: OAUTH_BASE_URL.to_string(),
            api_base_url: API_BASE_URL.to_string(),
        })
    }

    fn scope(&self) -> &str {
        self.credentials.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    fn token_from_response(response: TokenResponse) -> TokenSet {
        TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: Utc::now().timestamp() + response.expires_in,
        }
    }
}

#[async_trait]
impl DestinationPlatform for YtMusicClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::YtMusic
    }

    async fn request_device_code(&self) -> Result<DeviceAuthorization, PlatformError> {
        let url = format!("{}/device/code", self.oauth_base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("scope", self.scope()),
            ])
            .send()
            .await
            .map_err(|e| transport_error("YouTube device code request", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("YouTube device code request", response).await);
        }

        let body: DeviceCodeResponse = response.json().await.map_err(|e| {
            PlatformError::Platform(format!("YouTube device code request: malformed response: {}", e))
        })?;
        Ok(DeviceAuthorization {
            verification_url: body.verification_url,
            user_code: body.user_code,
            device_code: body.device_code,
            interval: body.interval,
            expires_in: body.expires_in,
        })
    }

    async fn poll_device_token(
        &self,
        device_code: &str,
    ) -> Result<DevicePollResult, PlatformError> {
        let url = format!("{}/token", self.oauth_base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("device_code", device_code),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ])
            .send()
            .await
            .map_err(|e| transport_error("YouTube device token poll", e))?;

        let status = response.status();
        if status.is_success() {
            let body: TokenResponse = response.json().await.map_err(|e| {
                PlatformError::Platform(format!("YouTube device token poll: malformed response: {}", e))
            })?;
            return Ok(DevicePollResult::Authorized(Self::token_from_response(
                body,
            )));
        }

        // Pending and expired device codes both come back as errors in the
        // body rather than distinct HTTP statuses.
        let body: String = response.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<OAuthErrorResponse>(&body) {
            match err.error.as_str() {
                "authorization_pending" | "slow_down" => return Ok(DevicePollResult::Pending),
                "expired_token" | "access_denied" => return Ok(DevicePollResult::Expired),
                _ => {}
            }
        }
        Err(PlatformError::Platform(format!(
            "YouTube device token poll failed with status {}: {}",
            status,
            body.chars().take(512).collect::<String>()
        )))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, PlatformError> {
        let url = format!("{}/token", self.oauth_base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| transport_error("YouTube token refresh", e))?;

        if !response.status().is_success() {
            if response.status() == reqwest::StatusCode::BAD_REQUEST {
                return Err(PlatformError::AuthExpired);
            }
            return Err(error_from_response("YouTube token refresh", response).await);
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            PlatformError::Platform(format!("YouTube token refresh: malformed response: {}", e))
        })?;
        Ok(Self::token_from_response(body))
    }

    async fn search_track(
        &self,
        token: &str,
        title: &str,
        artist: &str,
    ) -> Result<Vec<SearchHit>, PlatformError> {
        let query = format!("{} {}", title, artist);
        let url = format!("{}/search", self.api_base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("videoCategoryId", MUSIC_CATEGORY_ID),
                ("q", query.as_str()),
            ])
            .query(&[("maxResults", self.search_max_results)])
            .send()
            .await
            .map_err(|e| transport_error("YouTube search", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("YouTube search", response).await);
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            PlatformError::Platform(format!("YouTube search: malformed response: {}", e))
        })?;

        let hits: Vec<SearchHit> = body
            .items
            .into_iter()
            .filter_map(|item| {
                item.id.video_id.map(|video_id| SearchHit {
                    video_id,
                    title: item.snippet.title,
                    artist: item.snippet.channel_title,
                })
            })
            .collect();
        debug!("YouTube search for {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }

    async fn create_playlist(&self, token: &str, name: &str) -> Result<String, PlatformError> {
        let url = format!("{}/playlists", self.api_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .query(&[("part", "snippet,status")])
            .json(&json!({
                "snippet": { "title": name },
                "status": { "privacyStatus": "private" },
            }))
            .send()
            .await
            .map_err(|e| transport_error("YouTube playlist creation", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("YouTube playlist creation", response).await);
        }

        let body: PlaylistInsertResponse = response.json().await.map_err(|e| {
            PlatformError::Platform(format!(
                "YouTube playlist creation: malformed response: {}",
                e
            ))
        })?;
        debug!("Created YouTube playlist {} ({:?})", body.id, name);
        Ok(body.id)
    }

    async fn add_track(
        &self,
        token: &str,
        playlist_id: &str,
        video_id: &str,
    ) -> Result<(), PlatformError> {
        let url = format!("{}/playlistItems", self.api_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .query(&[("part", "snippet")])
            .json(&json!({
                "snippet": {
                    "playlistId": playlist_id,
                    "resourceId": {
                        "kind": "youtube#video",
                        "videoId": video_id,
                    },
                },
            }))
            .send()
            .await
            .map_err(|e| transport_error("YouTube playlist insert", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("YouTube playlist insert", response).await);
        }
        Ok(())
    }
}
