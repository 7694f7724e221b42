//! Spotify Web API client (source platform).
//!
//! Covers the authorization-code OAuth flow plus paginated playlist and track
//! listing. All endpoint shapes follow the public Web API documentation.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{
    error_from_response, transport_error, PlatformError, PlatformKind, PlaylistSummary,
    SourcePlatform, TokenSet, TrackDescriptor,
};
use crate::config::PlatformCredentials;

const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
const API_BASE_URL: &str = "https://api.spotify.com";
const DEFAULT_SCOPE: &str = "playlist-read-private playlist-read-collaborative";

pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: PlatformCredentials,
    page_size: u32,
    accounts_base_url: String,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: Utc::now().timestamp() + response.expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistsPage {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    id: String,
    name: String,
    tracks: PlaylistTracksRef,
}

#[derive(Debug, Deserialize)]
struct PlaylistTracksRef {
    total: u32,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    items: Vec<TrackEntry>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    // Local files and removed episodes come back with a null track.
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    name: String,
    artists: Vec<ArtistRef>,
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

impl SpotifyClient {
    pub fn new(
        credentials: PlatformCredentials,
        page_size: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials,
            page_size,
            accounts_base_url: ACCOUNTS_BASE_URL.to_string(),
            api_base_url: API_BASE_URL.to_string(),
        })
    }

    /// Point the client at different base URLs, for tests against a local stub.
    #[cfg(test)]
    fn with_base_urls(mut self, accounts: String, api: String) -> Self {
        self.accounts_base_url = accounts;
        self.api_base_url = api;
        self
    }

    fn scope(&self) -> &str {
        self.credentials.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    fn redirect_uri(&self) -> &str {
        self.credentials.redirect_uri.as_deref().unwrap_or("")
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        what: &str,
    ) -> Result<TokenSet, PlatformError> {
        let url = format!("{}/api/token", self.accounts_base_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(form)
            .send()
            .await
            .map_err(|e| transport_error(what, e))?;

        if !response.status().is_success() {
            // The token endpoint reports a bad or reused code as 400
            // invalid_grant, which for callers means re-authentication.
            if response.status() == reqwest::StatusCode::BAD_REQUEST {
                return Err(PlatformError::AuthExpired);
            }
            return Err(error_from_response(what, response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Platform(format!("{}: malformed response: {}", what, e)))?;
        Ok(token.into())
    }
}

#[async_trait]
impl SourcePlatform for SpotifyClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Spotify
    }

    fn authorize_url(&self) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&show_dialog=true",
            self.accounts_base_url,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(self.redirect_uri()),
            urlencoding::encode(self.scope()),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, PlatformError> {
        self.token_request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri()),
            ],
            "Spotify code exchange",
        )
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, PlatformError> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            "Spotify token refresh",
        )
        .await
    }

    async fn list_playlists(&self, token: &str) -> Result<Vec<PlaylistSummary>, PlatformError> {
        let mut playlists = Vec::new();
        let mut offset = 0u32;
        loop {
            let url = format!("{}/v1/me/playlists", self.api_base_url);
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(&[("limit", self.page_size), ("offset", offset)])
                .send()
                .await
                .map_err(|e| transport_error("Spotify playlist listing", e))?;

            if !response.status().is_success() {
                return Err(error_from_response("Spotify playlist listing", response).await);
            }

            let page: PlaylistsPage = response.json().await.map_err(|e| {
                PlatformError::Platform(format!("Spotify playlist listing: malformed page: {}", e))
            })?;

            let page_len = page.items.len() as u32;
            playlists.extend(page.items.into_iter().map(|item| PlaylistSummary {
                id: item.id,
                name: item.name,
                track_count: item.tracks.total,
            }));

            if page.next.is_none() || page_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }
        debug!("Listed {} Spotify playlists", playlists.len());
        Ok(playlists)
    }

    async fn list_playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
    ) -> Result<Vec<TrackDescriptor>, PlatformError> {
        let mut tracks = Vec::new();
        let mut offset = 0u32;
        loop {
            let url = format!("{}/v1/playlists/{}/tracks", self.api_base_url, playlist_id);
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(&[("limit", self.page_size), ("offset", offset)])
                .query(&[(
                    "fields",
                    "items(track(name,duration_ms,artists(name))),next",
                )])
                .send()
                .await
                .map_err(|e| transport_error("Spotify track listing", e))?;

            if !response.status().is_success() {
                return Err(error_from_response("Spotify track listing", response).await);
            }

            let page: TracksPage = response.json().await.map_err(|e| {
                PlatformError::Platform(format!("Spotify track listing: malformed page: {}", e))
            })?;

            let page_len = page.items.len() as u32;
            for entry in page.items {
                let Some(track) = entry.track else {
                    continue;
                };
                let artist = track
                    .artists
                    .first()
                    .map(|a| a.name.clone())
                    .unwrap_or_default();
                tracks.push(TrackDescriptor {
                    title: track.name,
                    artist,
                    duration_ms: track.duration_ms,
                });
            }

            if page.next.is_none() || page_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }
        debug!(
            "Listed {} tracks for Spotify playlist {}",
            tracks.len(),
            playlist_id
        );
        Ok(tracks)
    }
}
