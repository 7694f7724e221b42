//! Platform-agnostic vocabulary shared by the orchestrator and both clients.

use serde::{Deserialize, Serialize};

/// A playlist as listed on the source platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub track_count: u32,
}

/// One source track, in the shape the matcher works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub title: String,
    /// Primary (first-listed) artist.
    pub artist: String,
    pub duration_ms: Option<u64>,
}

/// One candidate returned by the destination platform's search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub video_id: String,
    pub title: String,
    pub artist: String,
}

/// OAuth tokens for one user on one platform.
///
/// `refresh_token` is optional because refresh responses may omit it, in which
/// case the previously stored one stays valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds after which `access_token` must not be used.
    pub expires_at: i64,
}

impl TokenSet {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Payload of the device-authorization step of the device-code OAuth flow.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthorization {
    pub verification_url: String,
    pub user_code: String,
    pub device_code: String,
    /// Recommended polling interval in seconds.
    pub interval: u64,
    /// Seconds until the device code expires.
    pub expires_in: u64,
}

/// Outcome of one poll of the device-code token endpoint.
#[derive(Debug, Clone)]
pub enum DevicePollResult {
    /// The user completed the out-of-band authorization.
    Authorized(TokenSet),
    /// Authorization still pending (includes the provider's slow-down hint).
    Pending,
    /// The device code expired or the user denied access.
    Expired,
}
