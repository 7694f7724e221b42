//! Playlist transfer: record bookkeeping, track matching and the
//! background orchestrator.

mod matcher;
mod models;
mod orchestrator;
mod record_store;
mod retry;
mod schema;

pub use matcher::TrackMatcher;
pub use models::{TransferRecord, TransferStatus};
pub use orchestrator::{TransferOrchestrator, TransferStartError};
pub use record_store::{SqliteTransferRecordStore, TransferRecordStore};
pub use retry::{with_rate_limit_retry, RetryPolicy};
