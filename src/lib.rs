//! Playlist transfer server library.
//!
//! Exposes the internal modules for testing and reuse by the binary.

pub mod config;
pub mod platform;
pub mod server;
pub mod sqlite_persistence;
pub mod transfer;
pub mod user;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig, TransferSettings};
pub use platform::{DestinationPlatform, SourcePlatform, SpotifyClient, YtMusicClient};
pub use server::{make_app, run_server, RequestsLoggingLevel};
pub use transfer::{SqliteTransferRecordStore, TransferRecordStore};
pub use user::{SqliteUserStore, UserStore};
