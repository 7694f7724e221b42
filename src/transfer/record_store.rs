use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::models::{TransferRecord, TransferStatus};
use super::schema::VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;

const DB_FILE_NAME: &str = "transfers.db";

/// Persistence for transfer records.
///
/// All state changes go through guarded UPDATEs whose WHERE clause encodes
/// the legal transition, so a record can never move backwards and counters
/// can never exceed the track total, regardless of interleaving.
pub trait TransferRecordStore: Send + Sync {
    /// Inserts a new PENDING record for the user.
    fn create_record(&self, user_id: &str, playlist_ids: &[String]) -> Result<TransferRecord>;

    fn get_record(&self, transfer_id: &str) -> Result<Option<TransferRecord>>;

    /// PENDING -> IN_PROGRESS, setting the track total in the same statement.
    /// Returns false if the record was not PENDING.
    fn begin_processing(&self, transfer_id: &str, total_tracks: u32) -> Result<bool>;

    /// Adds to the completed and failed counters of an IN_PROGRESS record.
    /// Returns false if the record was not IN_PROGRESS or the increments
    /// would push the counters past the total.
    fn record_progress(&self, transfer_id: &str, completed: u32, failed: u32) -> Result<bool>;

    /// IN_PROGRESS -> COMPLETED. Returns false if the record was not
    /// IN_PROGRESS.
    fn mark_completed(&self, transfer_id: &str) -> Result<bool>;

    /// PENDING or IN_PROGRESS -> FAILED, recording the reason. Returns false
    /// if the record was already terminal.
    fn mark_failed(&self, transfer_id: &str, error_message: &str) -> Result<bool>;
}

pub struct SqliteTransferRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTransferRecordStore {
    pub fn new(db_dir: &Path) -> Result<Self> {
        let conn = open_versioned(&db_dir.join(DB_FILE_NAME), VERSIONED_SCHEMAS, "transfers")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransferRecord> {
    let playlist_ids_json: String = row.get(2)?;
    let playlist_ids = serde_json::from_str(&playlist_ids_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status_str: String = row.get(3)?;
    let status = TransferStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown transfer status {:?}", status_str).into(),
        )
    })?;
    Ok(TransferRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        playlist_ids,
        status,
        total_tracks: row.get(4)?,
        completed_tracks: row.get(5)?,
        failed_tracks: row.get(6)?,
        error_message: row.get(7)?,
        created: row.get(8)?,
        updated: row.get(9)?,
    })
}

const SELECT_RECORD: &str = "SELECT id, user_id, playlist_ids, status, total_tracks, \
     completed_tracks, failed_tracks, error_message, created, updated \
     FROM transfer_records WHERE id = ?1;";

impl TransferRecordStore for SqliteTransferRecordStore {
    fn create_record(&self, user_id: &str, playlist_ids: &[String]) -> Result<TransferRecord> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let playlist_ids_json =
            serde_json::to_string(playlist_ids).context("Failed to encode playlist ids")?;
        conn.execute(
            "INSERT INTO transfer_records (id, user_id, playlist_ids, status) \
             VALUES (?1, ?2, ?3, ?4);",
            params![
                id,
                user_id,
                playlist_ids_json,
                TransferStatus::Pending.as_str()
            ],
        )
        .context("Failed to insert transfer record")?;
        conn.query_row(SELECT_RECORD, params![id], row_to_record)
            .context("Failed to read back created transfer record")
    }

    fn get_record(&self, transfer_id: &str) -> Result<Option<TransferRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(SELECT_RECORD, params![transfer_id], row_to_record)
            .optional()
            .context("Failed to query transfer record")
    }

    fn begin_processing(&self, transfer_id: &str, total_tracks: u32) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE transfer_records \
                 SET status = ?2, total_tracks = ?3, updated = cast(strftime('%s','now') as int) \
                 WHERE id = ?1 AND status = ?4;",
                params![
                    transfer_id,
                    TransferStatus::InProgress.as_str(),
                    total_tracks,
                    TransferStatus::Pending.as_str()
                ],
            )
            .context("Failed to move transfer record to IN_PROGRESS")?;
        Ok(updated > 0)
    }

    fn record_progress(&self, transfer_id: &str, completed: u32, failed: u32) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE transfer_records \
                 SET completed_tracks = completed_tracks + ?2, \
                     failed_tracks = failed_tracks + ?3, \
                     updated = cast(strftime('%s','now') as int) \
                 WHERE id = ?1 AND status = ?4 \
                   AND completed_tracks + failed_tracks + ?2 + ?3 <= total_tracks;",
                params![
                    transfer_id,
                    completed,
                    failed,
                    TransferStatus::InProgress.as_str()
                ],
            )
            .context("Failed to record transfer progress")?;
        Ok(updated > 0)
    }

    fn mark_completed(&self, transfer_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE transfer_records \
                 SET status = ?2, updated = cast(strftime('%s','now') as int) \
                 WHERE id = ?1 AND status = ?3;",
                params![
                    transfer_id,
                    TransferStatus::Completed.as_str(),
                    TransferStatus::InProgress.as_str()
                ],
            )
            .context("Failed to mark transfer record completed")?;
        Ok(updated > 0)
    }

    fn mark_failed(&self, transfer_id: &str, error_message: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE transfer_records \
                 SET status = ?2, error_message = ?3, \
                     updated = cast(strftime('%s','now') as int) \
                 WHERE id = ?1 AND status IN (?4, ?5);",
                params![
                    transfer_id,
                    TransferStatus::Failed.as_str(),
                    error_message,
                    TransferStatus::Pending.as_str(),
                    TransferStatus::InProgress.as_str()
                ],
            )
            .context("Failed to mark transfer record failed")?;
        Ok(updated > 0)
    }
}
