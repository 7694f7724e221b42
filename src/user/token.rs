use chrono::Utc;
use std::future::Future;
use tracing::warn;

use super::UserStore;
use crate::platform::{PlatformError, PlatformKind, TokenSet};

/// Returns a usable access token for the user on the given platform,
/// refreshing it through `refresh` when the stored one has expired.
///
/// Returns None when the user never logged in on the platform, when an
/// expired token has no refresh token, or when the refresh itself fails.
pub async fn valid_access_token<S, F, Fut>(
    store: &S,
    user_id: &str,
    platform: PlatformKind,
    refresh: F,
) -> Option<String>
where
    S: UserStore + ?Sized,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<TokenSet, PlatformError>>,
{
    let tokens = match store.get_tokens(user_id, platform) {
        Ok(Some(tokens)) => tokens,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to load {} tokens for user {}: {}", platform, user_id, e);
            return None;
        }
    };

    if !tokens.is_expired(Utc::now().timestamp()) {
        return Some(tokens.access_token);
    }

    let refresh_token = tokens.refresh_token?;
    let refreshed = match refresh(refresh_token).await {
        Ok(refreshed) => refreshed,
        Err(e) => {
            warn!("{} token refresh failed for user {}: {}", platform, user_id, e);
            return None;
        }
    };

    if let Err(e) = store.store_tokens(user_id, platform, &refreshed) {
        warn!("Failed to persist refreshed {} tokens for user {}: {}", platform, user_id, e);
    }
    Some(refreshed.access_token)
}
