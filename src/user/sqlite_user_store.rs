use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::schema::VERSIONED_SCHEMAS;
use super::{UserProfile, UserProfileInput, UserStore, UserStoreError};
use crate::platform::{PlatformKind, TokenSet};
use crate::sqlite_persistence::open_versioned;

const DB_FILE_NAME: &str = "users.db";

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new(db_dir: &Path) -> Result<Self> {
        let conn = open_versioned(&db_dir.join(DB_FILE_NAME), VERSIONED_SCHEMAS, "users")?;
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

    fn user_exists(conn: &Connection, user_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM user WHERE id = ?1;",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created: row.get(3)?,
    })
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, input: UserProfileInput) -> Result<UserProfile, UserStoreError> {
        let conn = self.conn.lock().unwrap();
        let id = input
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        conn.execute(
            "INSERT INTO user (id, name, email) VALUES (?1, ?2, ?3);",
            params![id, input.name, input.email],
        )
        .context("Failed to insert user")?;
        let profile = conn
            .query_row(
                "SELECT id, name, email, created FROM user WHERE id = ?1;",
                params![id],
                row_to_profile,
            )
            .context("Failed to read back created user")?;
        Ok(profile)
    }

    fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, UserStoreError> {
        let conn = self.conn.lock().unwrap();
        let profile = conn
            .query_row(
                "SELECT id, name, email, created FROM user WHERE id = ?1;",
                params![user_id],
                row_to_profile,
            )
            .optional()
            .context("Failed to query user")?;
        Ok(profile)
    }

    fn list_users(&self) -> Result<Vec<UserProfile>, UserStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut statement = conn
            .prepare("SELECT id, name, email, created FROM user ORDER BY created, id;")
            .context("Failed to prepare user listing")?;
        let profiles = statement
            .query_map([], row_to_profile)
            .context("Failed to query users")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read user rows")?;
        Ok(profiles)
    }

    fn update_user(
        &self,
        user_id: &str,
        input: UserProfileInput,
    ) -> Result<Option<UserProfile>, UserStoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE user SET name = ?2, email = ?3 WHERE id = ?1;",
                params![user_id, input.name, input.email],
            )
            .context("Failed to update user")?;
        if updated == 0 {
            return Ok(None);
        }
        let profile = conn
            .query_row(
                "SELECT id, name, email, created FROM user WHERE id = ?1;",
                params![user_id],
                row_to_profile,
            )
            .context("Failed to read back updated user")?;
        Ok(Some(profile))
    }

    fn delete_user(&self, user_id: &str) -> Result<bool, UserStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM platform_tokens WHERE user_id = ?1;",
            params![user_id],
        )
        .context("Failed to delete user tokens")?;
        let deleted = conn
            .execute("DELETE FROM user WHERE id = ?1;", params![user_id])
            .context("Failed to delete user")?;
        Ok(deleted > 0)
    }

    fn get_tokens(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<TokenSet>, UserStoreError> {
        let conn = self.conn.lock().unwrap();
        let tokens = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at FROM platform_tokens \
                 WHERE user_id = ?1 AND platform = ?2;",
                params![user_id, platform.as_str()],
                |row| {
                    Ok(TokenSet {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query platform tokens")?;
        Ok(tokens)
    }

    fn store_tokens(
        &self,
        user_id: &str,
        platform: PlatformKind,
        tokens: &TokenSet,
    ) -> Result<(), UserStoreError> {
        let conn = self.conn.lock().unwrap();
        if !Self::user_exists(&conn, user_id).map_err(UserStoreError::Internal)? {
            return Err(UserStoreError::UnknownUser(user_id.to_string()));
        }
        // COALESCE keeps the previously stored refresh token when the refresh
        // response omitted it.
        conn.execute(
            "INSERT INTO platform_tokens (user_id, platform, access_token, refresh_token, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (user_id, platform) DO UPDATE SET \
               access_token = excluded.access_token, \
               refresh_token = COALESCE(excluded.refresh_token, platform_tokens.refresh_token), \
               expires_at = excluded.expires_at, \
               updated = cast(strftime('%s','now') as int);",
            params![
                user_id,
                platform.as_str(),
                tokens.access_token,
                tokens.refresh_token,
                tokens.expires_at
            ],
        )
        .context("Failed to store platform tokens")?;
        Ok(())
    }
}
