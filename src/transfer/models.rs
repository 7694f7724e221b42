use serde::{Deserialize, Serialize};

/// Lifecycle of a transfer record. Transitions are forward-only:
/// PENDING -> IN_PROGRESS -> COMPLETED, with FAILED reachable from the two
/// non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::InProgress => "IN_PROGRESS",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransferStatus::Pending),
            "IN_PROGRESS" => Some(TransferStatus::InProgress),
            "COMPLETED" => Some(TransferStatus::Completed),
            "FAILED" => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub id: String,
    pub user_id: String,
    pub playlist_ids: Vec<String>,
    pub status: TransferStatus,
    pub total_tracks: u32,
    pub completed_tracks: u32,
    pub failed_tracks: u32,
    pub error_message: Option<String>,
    pub created: i64,
    pub updated: i64,
}
