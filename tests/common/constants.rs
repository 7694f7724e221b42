//! Shared constants for end-to-end tests

/// Timeout for individual HTTP requests in tests
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Authorization code the mock source accepts
pub const VALID_AUTH_CODE: &str = "valid-auth-code";

/// Device code the mock destination reports as authorized
pub const AUTHORIZED_DEVICE_CODE: &str = "device-code-authorized";

/// Device code the mock destination keeps reporting as pending
pub const PENDING_DEVICE_CODE: &str = "device-code-pending";

/// Device code the mock destination reports as expired
pub const EXPIRED_DEVICE_CODE: &str = "device-code-expired";

/// Id of the seeded source playlist
pub const PLAYLIST_1_ID: &str = "playlist-1";

/// Name of the seeded source playlist
pub const PLAYLIST_1_NAME: &str = "Road Trip";

/// Track title the mock destination never finds a match for
pub const UNMATCHABLE_TITLE: &str = "Unmatchable Song";
