//! User profiles and per-platform OAuth token storage.

mod models;
mod schema;
mod sqlite_user_store;
mod token;

pub use models::{UserProfile, UserProfileInput};
pub use sqlite_user_store::SqliteUserStore;
pub use token::valid_access_token;

use crate::platform::{PlatformKind, TokenSet};

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub trait UserStore: Send + Sync {
    /// Creates a new user profile, generating an id when the input does not
    /// carry one.
    fn create_user(&self, input: UserProfileInput) -> Result<UserProfile, UserStoreError>;

    /// Returns None if the user does not exist.
    fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, UserStoreError>;

    /// All profiles, oldest first.
    fn list_users(&self) -> Result<Vec<UserProfile>, UserStoreError>;

    /// Replaces the mutable profile fields.
    /// Returns None if the user does not exist.
    fn update_user(
        &self,
        user_id: &str,
        input: UserProfileInput,
    ) -> Result<Option<UserProfile>, UserStoreError>;

    /// Deletes the user and any stored tokens. Returns false if the user
    /// did not exist.
    fn delete_user(&self, user_id: &str) -> Result<bool, UserStoreError>;

    /// Returns the stored token set for a platform, None if the user never
    /// logged in there.
    fn get_tokens(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<TokenSet>, UserStoreError>;

    /// Upserts the token set for a platform. When the new set carries no
    /// refresh token the previously stored one is kept, since token refresh
    /// responses usually omit it.
    ///
    /// Fails with `UnknownUser` when the user does not exist.
    fn store_tokens(
        &self,
        user_id: &str,
        platform: PlatformKind,
        tokens: &TokenSet,
    ) -> Result<(), UserStoreError>;
}
