//! Clients for the two music platforms.
//!
//! The orchestrator only sees the `SourcePlatform` and `DestinationPlatform`
//! traits; the Spotify and YouTube implementations translate those calls into
//! the respective REST APIs, including pagination and OAuth token exchange.

mod models;
mod spotify;
mod ytmusic;

pub use models::{
    DeviceAuthorization, DevicePollResult, PlaylistSummary, SearchHit, TokenSet, TrackDescriptor,
};
pub use spotify::SpotifyClient;
pub use ytmusic::YtMusicClient;

use async_trait::async_trait;
use std::time::Duration;

/// Which platform a stored token set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    Spotify,
    YtMusic,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Spotify => "spotify",
            PlatformKind::YtMusic => "ytmusic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "spotify" => Some(PlatformKind::Spotify),
            "ytmusic" => Some(PlatformKind::YtMusic),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy for platform calls.
///
/// `AuthExpired` entitles the caller to one refresh-and-retry; `RateLimited`
/// is retried with bounded backoff; `Platform` is not retried and becomes a
/// track-level or transfer-level failure depending on which call raised it.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("access token expired or rejected")]
    AuthExpired,
    #[error("rate limited by platform")]
    RateLimited { retry_after: Option<Duration> },
    #[error("platform error: {0}")]
    Platform(String),
}

impl PlatformError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PlatformError::RateLimited { .. })
    }
}

/// The platform playlists are read from.
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// User-facing OAuth consent URL.
    fn authorize_url(&self) -> String;

    /// Exchange an authorization code from the OAuth callback for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, PlatformError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, PlatformError>;

    /// All playlists of the authenticated user, fully paged.
    async fn list_playlists(&self, token: &str) -> Result<Vec<PlaylistSummary>, PlatformError>;

    /// All tracks of one playlist, fully paged, in playlist order.
    async fn list_playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
    ) -> Result<Vec<TrackDescriptor>, PlatformError>;
}

/// The platform the playlist is rebuilt on.
#[async_trait]
pub trait DestinationPlatform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Start the device-code OAuth flow.
    async fn request_device_code(&self) -> Result<DeviceAuthorization, PlatformError>;

    /// Poll the token endpoint for a previously issued device code.
    async fn poll_device_token(&self, device_code: &str)
        -> Result<DevicePollResult, PlatformError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, PlatformError>;

    /// Search for candidate matches for a track, best first.
    async fn search_track(
        &self,
        token: &str,
        title: &str,
        artist: &str,
    ) -> Result<Vec<SearchHit>, PlatformError>;

    /// Create a new (private) playlist, returning its id.
    async fn create_playlist(&self, token: &str, name: &str) -> Result<String, PlatformError>;

    async fn add_track(
        &self,
        token: &str,
        playlist_id: &str,
        video_id: &str,
    ) -> Result<(), PlatformError>;
}

/// Map a non-success HTTP response to the error taxonomy, consuming the body
/// for the diagnostic message.
pub(crate) async fn error_from_response(
    what: &str,
    response: reqwest::Response,
) -> PlatformError {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return PlatformError::AuthExpired;
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return PlatformError::RateLimited { retry_after };
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(512)
        .collect();
    PlatformError::Platform(format!("{} failed with status {}: {}", what, status, body))
}

pub(crate) fn transport_error(what: &str, err: reqwest::Error) -> PlatformError {
    PlatformError::Platform(format!("{} transport error: {}", what, err))
}
