//! Mock platform clients for end-to-end tests
//!
//! The mocks stand in for the Spotify and YouTube APIs so tests exercise the
//! whole server without network access. Behavior is driven by well-known
//! constants (auth codes, device codes, the unmatchable track title).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use portify_transfer_server::platform::{
    DestinationPlatform, DeviceAuthorization, DevicePollResult, PlatformError, PlatformKind,
    PlaylistSummary, SearchHit, SourcePlatform, TokenSet, TrackDescriptor,
};

use super::constants::*;

fn fresh_tokens(prefix: &str) -> TokenSet {
    TokenSet {
        access_token: format!("{}-access-token", prefix),
        refresh_token: Some(format!("{}-refresh-token", prefix)),
        expires_at: Utc::now().timestamp() + 3600,
    }
}

pub struct MockSpotify {
    playlists: Vec<PlaylistSummary>,
    tracks: HashMap<String, Vec<TrackDescriptor>>,
}

impl MockSpotify {
    /// One playlist with three tracks, one of which the mock destination
    /// cannot match.
    pub fn with_default_catalog() -> Self {
        let tracks = vec![
            TrackDescriptor {
                title: "Karma Police".to_string(),
                artist: "Radiohead".to_string(),
                duration_ms: Some(261_000),
            },
            TrackDescriptor {
                title: UNMATCHABLE_TITLE.to_string(),
                artist: "Nobody".to_string(),
                duration_ms: None,
            },
            TrackDescriptor {
                title: "Paranoid Android".to_string(),
                artist: "Radiohead".to_string(),
                duration_ms: Some(387_000),
            },
        ];
        let mut track_map = HashMap::new();
        track_map.insert(PLAYLIST_1_ID.to_string(), tracks.clone());
        Self {
            playlists: vec![PlaylistSummary {
                id: PLAYLIST_1_ID.to_string(),
                name: PLAYLIST_1_NAME.to_string(),
                track_count: tracks.len() as u32,
            }],
            tracks: track_map,
        }
    }
}

#[async_trait]
impl SourcePlatform for MockSpotify {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Spotify
    }

    fn authorize_url(&self) -> String {
        "http://source.test/authorize?client_id=test".to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, PlatformError> {
        if code == VALID_AUTH_CODE {
            Ok(fresh_tokens("spotify"))
        } else {
            Err(PlatformError::AuthExpired)
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, PlatformError> {
        Ok(fresh_tokens("spotify"))
    }

    async fn list_playlists(&self, _token: &str) -> Result<Vec<PlaylistSummary>, PlatformError> {
        Ok(self.playlists.clone())
    }

    async fn list_playlist_tracks(
        &self,
        _token: &str,
        playlist_id: &str,
    ) -> Result<Vec<TrackDescriptor>, PlatformError> {
        self.tracks
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| PlatformError::Platform(format!("no such playlist {}", playlist_id)))
    }
}

#[derive(Default)]
pub struct MockYtMusic {
    pub created_playlists: Mutex<Vec<String>>,
    pub added_tracks: Mutex<Vec<String>>,
    pub poll_calls: AtomicU32,
}

#[async_trait]
impl DestinationPlatform for MockYtMusic {
    fn kind(&self) -> PlatformKind {
        PlatformKind::YtMusic
    }

    async fn request_device_code(&self) -> Result<DeviceAuthorization, PlatformError> {
        Ok(DeviceAuthorization {
            verification_url: "http://destination.test/device".to_string(),
            user_code: "ABCD-EFGH".to_string(),
            device_code: AUTHORIZED_DEVICE_CODE.to_string(),
            interval: 1,
            expires_in: 1800,
        })
    }

    async fn poll_device_token(
        &self,
        device_code: &str,
    ) -> Result<DevicePollResult, PlatformError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        match device_code {
            AUTHORIZED_DEVICE_CODE => Ok(DevicePollResult::Authorized(fresh_tokens("ytmusic"))),
            PENDING_DEVICE_CODE => Ok(DevicePollResult::Pending),
            EXPIRED_DEVICE_CODE => Ok(DevicePollResult::Expired),
            _ => Err(PlatformError::Platform("unknown device code".to_string())),
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, PlatformError> {
        Ok(fresh_tokens("ytmusic"))
    }

    async fn search_track(
        &self,
        _token: &str,
        title: &str,
        artist: &str,
    ) -> Result<Vec<SearchHit>, PlatformError> {
        if title.to_lowercase().contains("unmatchable") {
            return Ok(vec![]);
        }
        Ok(vec![SearchHit {
            video_id: format!("video-{}", title.to_lowercase().replace(' ', "-")),
            title: title.to_string(),
            artist: artist.to_string(),
        }])
    }

    async fn create_playlist(&self, _token: &str, name: &str) -> Result<String, PlatformError> {
        self.created_playlists.lock().unwrap().push(name.to_string());
        Ok("dest-playlist-1".to_string())
    }

    async fn add_track(
        &self,
        _token: &str,
        _playlist_id: &str,
        video_id: &str,
    ) -> Result<(), PlatformError> {
        self.added_tracks.lock().unwrap().push(video_id.to_string());
        Ok(())
    }
}
