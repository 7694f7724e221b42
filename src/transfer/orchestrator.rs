//! Runs playlist transfers in the background and answers status queries.
//!
//! A transfer moves all tracks of the requested source playlists into one
//! newly created destination playlist. The work runs in a detached task; the
//! transfer record is the only channel back to the caller.

use anyhow::anyhow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::matcher::TrackMatcher;
use super::models::TransferRecord;
use super::record_store::TransferRecordStore;
use super::retry::{with_rate_limit_retry, RetryPolicy};
use crate::config::TransferSettings;
use crate::platform::{
    DestinationPlatform, PlatformError, PlatformKind, SourcePlatform, TrackDescriptor,
};
use crate::user::{valid_access_token, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum TransferStartError {
    #[error("{0}")]
    Validation(String),
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("user is not logged in on {0}")]
    NotLoggedIn(PlatformKind),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct TransferOrchestrator {
    records: Arc<dyn TransferRecordStore>,
    users: Arc<dyn UserStore>,
    source: Arc<dyn SourcePlatform>,
    destination: Arc<dyn DestinationPlatform>,
    settings: TransferSettings,
}

impl TransferOrchestrator {
    pub fn new(
        records: Arc<dyn TransferRecordStore>,
        users: Arc<dyn UserStore>,
        source: Arc<dyn SourcePlatform>,
        destination: Arc<dyn DestinationPlatform>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            records,
            users,
            source,
            destination,
            settings,
        }
    }

    /// Validates the request, creates a PENDING record and spawns the
    /// background task. The returned record is the caller's handle for
    /// status polling.
    pub async fn start_transfer(
        self: &Arc<Self>,
        user_id: &str,
        playlist_ids: Vec<String>,
    ) -> Result<TransferRecord, TransferStartError> {
        if playlist_ids.is_empty() {
            return Err(TransferStartError::Validation(
                "playlist_ids must not be empty".to_string(),
            ));
        }
        let user = self
            .users
            .get_user(user_id)
            .map_err(|e| TransferStartError::Internal(e.into()))?;
        if user.is_none() {
            return Err(TransferStartError::UnknownUser(user_id.to_string()));
        }

        let source_token = valid_access_token(
            self.users.as_ref(),
            user_id,
            self.source.kind(),
            |rt| async move { self.source.refresh_token(&rt).await },
        )
        .await
        .ok_or_else(|| TransferStartError::NotLoggedIn(self.source.kind()))?;
        let dest_token = valid_access_token(
            self.users.as_ref(),
            user_id,
            self.destination.kind(),
            |rt| async move { self.destination.refresh_token(&rt).await },
        )
        .await
        .ok_or_else(|| TransferStartError::NotLoggedIn(self.destination.kind()))?;

        let record = self
            .records
            .create_record(user_id, &playlist_ids)
            .map_err(TransferStartError::Internal)?;
        info!(
            "Starting transfer {} for user {} ({} playlists)",
            record.id,
            user_id,
            playlist_ids.len()
        );

        let orchestrator = Arc::clone(self);
        let transfer_id = record.id.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            orchestrator
                .run(transfer_id, user_id, playlist_ids, source_token, dest_token)
                .await;
        });
        Ok(record)
    }

    /// The record for a transfer, or None when it does not exist or belongs
    /// to a different user.
    pub fn transfer_status(
        &self,
        user_id: &str,
        transfer_id: &str,
    ) -> anyhow::Result<Option<TransferRecord>> {
        let record = self.records.get_record(transfer_id)?;
        Ok(record.filter(|r| r.user_id == user_id))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.settings.max_attempts,
            initial_backoff: Duration::from_millis(self.settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.settings.max_backoff_ms),
            multiplier: self.settings.backoff_multiplier,
        }
    }

    async fn refresh_source_token(&self, user_id: &str) -> Option<String> {
        self.refresh_token_for(user_id, self.source.kind(), |rt| async move {
            self.source.refresh_token(&rt).await
        })
        .await
    }

    async fn refresh_destination_token(&self, user_id: &str) -> Option<String> {
        self.refresh_token_for(user_id, self.destination.kind(), |rt| async move {
            self.destination.refresh_token(&rt).await
        })
        .await
    }

    async fn refresh_token_for<F, Fut>(
        &self,
        user_id: &str,
        platform: PlatformKind,
        refresh: F,
    ) -> Option<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<crate::platform::TokenSet, PlatformError>>,
    {
        let stored = match self.users.get_tokens(user_id, platform) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to load {} tokens for user {}: {}", platform, user_id, e);
                return None;
            }
        };
        let refresh_token = stored.refresh_token?;
        let refreshed = match refresh(refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("{} token refresh failed for user {}: {}", platform, user_id, e);
                return None;
            }
        };
        if let Err(e) = self.users.store_tokens(user_id, platform, &refreshed) {
            warn!(
                "Failed to persist refreshed {} tokens for user {}: {}",
                platform, user_id, e
            );
        }
        Some(refreshed.access_token)
    }

    /// Runs a platform call with rate-limit retries and a single
    /// refresh-and-retry when the access token turns out to be expired.
    async fn call_with_auth<T, F, Fut, R, RFut>(
        &self,
        what: &str,
        token: &mut String,
        op: F,
        refresh: R,
    ) -> Result<T, PlatformError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
        R: FnOnce() -> RFut,
        RFut: Future<Output = Option<String>>,
    {
        let policy = self.retry_policy();
        match with_rate_limit_retry(&policy, what, || op(token.clone())).await {
            Err(PlatformError::AuthExpired) => {
                let refreshed = refresh().await.ok_or(PlatformError::AuthExpired)?;
                *token = refreshed;
                with_rate_limit_retry(&policy, what, || op(token.clone())).await
            }
            other => other,
        }
    }

    async fn run(
        self: Arc<Self>,
        transfer_id: String,
        user_id: String,
        playlist_ids: Vec<String>,
        source_token: String,
        dest_token: String,
    ) {
        match self
            .run_inner(&transfer_id, &user_id, &playlist_ids, source_token, dest_token)
            .await
        {
            Ok(()) => info!("Transfer {} finished", transfer_id),
            Err(e) => {
                warn!("Transfer {} failed: {:#}", transfer_id, e);
                match self.records.mark_failed(&transfer_id, &format!("{:#}", e)) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("Transfer {} was already terminal when failing it", transfer_id)
                    }
                    Err(store_err) => warn!(
                        "Failed to mark transfer {} failed: {:#}",
                        transfer_id, store_err
                    ),
                }
            }
        }
    }

    async fn run_inner(
        &self,
        transfer_id: &str,
        user_id: &str,
        playlist_ids: &[String],
        mut source_token: String,
        mut dest_token: String,
    ) -> anyhow::Result<()> {
        // Enumeration phase. Any error here is unrecoverable: without the
        // full track list the total would be wrong.
        let playlists = self
            .call_with_auth(
                "source playlist listing",
                &mut source_token,
                |t| async move { self.source.list_playlists(&t).await },
                || self.refresh_source_token(user_id),
            )
            .await
            .map_err(|e| anyhow!("failed to list source playlists: {}", e))?;

        let mut first_playlist_name = None;
        let mut tracks: Vec<TrackDescriptor> = Vec::new();
        for playlist_id in playlist_ids {
            let playlist = playlists
                .iter()
                .find(|p| &p.id == playlist_id)
                .ok_or_else(|| anyhow!("source playlist {} not found", playlist_id))?;
            if first_playlist_name.is_none() {
                first_playlist_name = Some(playlist.name.clone());
            }
            let playlist_tracks = self
                .call_with_auth(
                    "source track listing",
                    &mut source_token,
                    |t| async move { self.source.list_playlist_tracks(&t, playlist_id).await },
                    || self.refresh_source_token(user_id),
                )
                .await
                .map_err(|e| anyhow!("failed to list tracks of playlist {}: {}", playlist_id, e))?;
            tracks.extend(playlist_tracks);
        }

        let total = tracks.len() as u32;
        if !self.records.begin_processing(transfer_id, total)? {
            warn!("Transfer {} is no longer PENDING, aborting", transfer_id);
            return Ok(());
        }
        info!("Transfer {} enumerated {} tracks", transfer_id, total);

        let playlist_name = format!(
            "{} (transferred)",
            first_playlist_name.unwrap_or_else(|| "Playlist".to_string())
        );
        // Created on the first successful match, so a transfer where nothing
        // matches leaves no empty playlist behind.
        let mut dest_playlist_id: Option<String> = None;

        let matcher = TrackMatcher::new(self.settings.match_threshold);
        let mut pending_completed = 0u32;
        let mut pending_failed = 0u32;
        for track in &tracks {
            match self
                .transfer_track(
                    user_id,
                    &mut dest_token,
                    &matcher,
                    &mut dest_playlist_id,
                    &playlist_name,
                    track,
                )
                .await
            {
                Ok(TrackOutcome::Added) => pending_completed += 1,
                Ok(TrackOutcome::Skipped(reason)) => {
                    info!(
                        "Transfer {}: skipping {:?} by {:?}: {}",
                        transfer_id, track.title, track.artist, reason
                    );
                    pending_failed += 1;
                }
                // Without the shared playlist nothing can be appended, so a
                // creation failure is unrecoverable.
                Err(TrackError::PlaylistCreation(e)) => {
                    self.flush_progress(transfer_id, &mut pending_completed, &mut pending_failed);
                    return Err(anyhow!("failed to create destination playlist: {}", e));
                }
                // An expired token that could not be refreshed will fail for
                // every remaining track as well, so the whole transfer fails.
                Err(TrackError::Track(PlatformError::AuthExpired)) => {
                    self.flush_progress(transfer_id, &mut pending_completed, &mut pending_failed);
                    return Err(anyhow!("destination authentication expired mid-transfer"));
                }
                Err(TrackError::Track(e)) => {
                    info!(
                        "Transfer {}: failed to transfer {:?} by {:?}: {}",
                        transfer_id, track.title, track.artist, e
                    );
                    pending_failed += 1;
                }
            }
            if pending_completed + pending_failed >= self.settings.progress_batch_size {
                self.flush_progress(transfer_id, &mut pending_completed, &mut pending_failed);
            }
        }
        self.flush_progress(transfer_id, &mut pending_completed, &mut pending_failed);

        if !self.records.mark_completed(transfer_id)? {
            warn!(
                "Transfer {} was not IN_PROGRESS when completing it",
                transfer_id
            );
        }
        Ok(())
    }

    async fn transfer_track(
        &self,
        user_id: &str,
        dest_token: &mut String,
        matcher: &TrackMatcher,
        dest_playlist_id: &mut Option<String>,
        playlist_name: &str,
        track: &TrackDescriptor,
    ) -> Result<TrackOutcome, TrackError> {
        let hits = self
            .call_with_auth(
                "destination search",
                dest_token,
                |t| async move { self.destination.search_track(&t, &track.title, &track.artist).await },
                || self.refresh_destination_token(user_id),
            )
            .await
            .map_err(TrackError::Track)?;

        let Some(hit) = matcher.best_match(track, &hits) else {
            return Ok(TrackOutcome::Skipped("no acceptable match".to_string()));
        };

        let playlist_id = match dest_playlist_id {
            Some(id) => id.clone(),
            None => {
                let id = self
                    .call_with_auth(
                        "destination playlist creation",
                        dest_token,
                        |t| {
                            let name = playlist_name.to_string();
                            async move { self.destination.create_playlist(&t, &name).await }
                        },
                        || self.refresh_destination_token(user_id),
                    )
                    .await
                    .map_err(TrackError::PlaylistCreation)?;
                *dest_playlist_id = Some(id.clone());
                id
            }
        };

        let video_id = hit.video_id.clone();
        self.call_with_auth(
            "destination playlist insert",
            dest_token,
            |t| {
                let video_id = video_id.clone();
                let playlist_id = playlist_id.clone();
                async move {
                    self.destination
                        .add_track(&t, &playlist_id, &video_id)
                        .await
                }
            },
            || self.refresh_destination_token(user_id),
        )
        .await
        .map_err(TrackError::Track)?;
        Ok(TrackOutcome::Added)
    }

    fn flush_progress(&self, transfer_id: &str, completed: &mut u32, failed: &mut u32) {
        if *completed == 0 && *failed == 0 {
            return;
        }
        match self.records.record_progress(transfer_id, *completed, *failed) {
            Ok(true) => {}
            Ok(false) => warn!(
                "Progress update for transfer {} was rejected",
                transfer_id
            ),
            Err(e) => warn!(
                "Failed to persist progress for transfer {}: {:#}",
                transfer_id, e
            ),
        }
        *completed = 0;
        *failed = 0;
    }
}

enum TrackOutcome {
    Added,
    Skipped(String),
}

enum TrackError {
    /// The shared destination playlist could not be created; the whole
    /// transfer fails since there is nothing to append to.
    PlaylistCreation(PlatformError),
    /// Failure of a single track; absorbed by the loop.
    Track(PlatformError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{
        DeviceAuthorization, DevicePollResult, PlaylistSummary, SearchHit, TokenSet,
    };
    use crate::transfer::models::TransferStatus;
    use crate::transfer::record_store::SqliteTransferRecordStore;
    use crate::user::{SqliteUserStore, UserProfileInput};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MockSource {
        playlists: Vec<PlaylistSummary>,
        tracks: HashMap<String, Vec<TrackDescriptor>>,
        fail_listing_with_auth: bool,
        refresh_result: Option<TokenSet>,
    }

    impl MockSource {
        fn with_playlist(name: &str, tracks: Vec<TrackDescriptor>) -> Self {
            let mut track_map = HashMap::new();
            track_map.insert("p1".to_string(), tracks.clone());
            Self {
                playlists: vec![PlaylistSummary {
                    id: "p1".to_string(),
                    name: name.to_string(),
                    track_count: tracks.len() as u32,
                }],
                tracks: track_map,
                fail_listing_with_auth: false,
                refresh_result: None,
            }
        }
    }

    #[async_trait]
    impl SourcePlatform for MockSource {
        fn kind(&self) -> PlatformKind {
            PlatformKind::Spotify
        }

        fn authorize_url(&self) -> String {
            "http://source.test/authorize".to_string()
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenSet, PlatformError> {
            unimplemented!("not used by the orchestrator")
        }

        async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, PlatformError> {
            self.refresh_result
                .clone()
                .ok_or(PlatformError::AuthExpired)
        }

        async fn list_playlists(&self, _token: &str) -> Result<Vec<PlaylistSummary>, PlatformError> {
            if self.fail_listing_with_auth {
                return Err(PlatformError::AuthExpired);
            }
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
                .ok_or_else(|| PlatformError::Platform("no such playlist".to_string()))
        }
    }

    #[derive(Default)]
    struct MockDestination {
        search_calls: AtomicU32,
        create_calls: AtomicU32,
        added: Mutex<Vec<String>>,
        rate_limit_searches: bool,
        auth_expired_searches_before_refresh: bool,
        fail_playlist_creation: bool,
        token_generation: AtomicU32,
    }

    #[async_trait]
    impl DestinationPlatform for MockDestination {
        fn kind(&self) -> PlatformKind {
            PlatformKind::YtMusic
        }

        async fn request_device_code(&self) -> Result<DeviceAuthorization, PlatformError> {
            unimplemented!("not used by the orchestrator")
        }

        async fn poll_device_token(
            &self,
            _device_code: &str,
        ) -> Result<DevicePollResult, PlatformError> {
            unimplemented!("not used by the orchestrator")
        }

        async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, PlatformError> {
            let generation = self.token_generation.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenSet {
                access_token: format!("dest-token-{}", generation),
                refresh_token: None,
                expires_at: Utc::now().timestamp() + 3600,
            })
        }

        async fn search_track(
            &self,
            token: &str,
            title: &str,
            artist: &str,
        ) -> Result<Vec<SearchHit>, PlatformError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.rate_limit_searches {
                return Err(PlatformError::RateLimited { retry_after: None });
            }
            if self.auth_expired_searches_before_refresh && !token.starts_with("dest-token-") {
                return Err(PlatformError::AuthExpired);
            }
            if title.to_lowercase().contains("unmatchable") {
                return Ok(vec![]);
            }
            Ok(vec![SearchHit {
                video_id: format!("video-{}", title.to_lowercase().replace(' ', "-")),
                title: title.to_string(),
                artist: artist.to_string(),
            }])
        }

        async fn create_playlist(&self, _token: &str, _name: &str) -> Result<String, PlatformError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_playlist_creation {
                return Err(PlatformError::Platform(
                    "playlist quota exceeded".to_string(),
                ));
            }
            Ok("dest-playlist".to_string())
        }

        async fn add_track(
            &self,
            _token: &str,
            _playlist_id: &str,
            video_id: &str,
        ) -> Result<(), PlatformError> {
            self.added.lock().unwrap().push(video_id.to_string());
            Ok(())
        }
    }

    fn track(title: &str, artist: &str) -> TrackDescriptor {
        TrackDescriptor {
            title: title.to_string(),
            artist: artist.to_string(),
            duration_ms: Some(200_000),
        }
    }

    fn test_settings() -> TransferSettings {
        TransferSettings {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            progress_batch_size: 1,
            ..TransferSettings::default()
        }
    }

    fn seed_user(users: &SqliteUserStore, with_tokens: bool, with_refresh: bool) -> String {
        let user_id = users
            .create_user(UserProfileInput {
                id: None,
                name: "alice".to_string(),
                email: None,
            })
            .unwrap()
            .id;
        if with_tokens {
            let expires_at = Utc::now().timestamp() + 3600;
            for platform in [PlatformKind::Spotify, PlatformKind::YtMusic] {
                users
                    .store_tokens(
                        &user_id,
                        platform,
                        &TokenSet {
                            access_token: format!("{}-access", platform),
                            refresh_token: with_refresh.then(|| format!("{}-refresh", platform)),
                            expires_at,
                        },
                    )
                    .unwrap();
            }
        }
        user_id
    }

    fn orchestrator(
        source: MockSource,
        destination: Arc<MockDestination>,
        users: Arc<SqliteUserStore>,
    ) -> Arc<TransferOrchestrator> {
        Arc::new(TransferOrchestrator::new(
            Arc::new(SqliteTransferRecordStore::in_memory().unwrap()),
            users,
            Arc::new(source),
            destination,
            test_settings(),
        ))
    }

    async fn wait_terminal(
        orchestrator: &Arc<TransferOrchestrator>,
        user_id: &str,
        transfer_id: &str,
    ) -> TransferRecord {
        for _ in 0..400 {
            let record = orchestrator
                .transfer_status(user_id, transfer_id)
                .unwrap()
                .unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("transfer {} did not reach a terminal state", transfer_id);
    }

    #[tokio::test]
    async fn unmatched_tracks_count_as_failed_but_transfer_completes() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, true, true);
        let source = MockSource::with_playlist(
            "Road Trip",
            vec![
                track("Karma Police", "Radiohead"),
                track("Unmatchable Song", "Nobody"),
                track("Paranoid Android", "Radiohead"),
            ],
        );
        let destination = Arc::new(MockDestination::default());
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await
            .unwrap();
        assert_eq!(record.status, TransferStatus::Pending);

        let record = wait_terminal(&orchestrator, &user_id, &record.id).await;
        assert_eq!(record.status, TransferStatus::Completed);
        assert_eq!(record.total_tracks, 3);
        assert_eq!(record.completed_tracks, 2);
        assert_eq!(record.failed_tracks, 1);
        assert!(record.error_message.is_none());
        assert_eq!(destination.added.lock().unwrap().len(), 2);
        assert_eq!(destination.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_destination_playlist_is_created_when_nothing_matches() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, true, true);
        let source = MockSource::with_playlist(
            "Road Trip",
            vec![
                track("Unmatchable Song", "Nobody"),
                track("Unmatchable Ballad", "Nobody"),
            ],
        );
        let destination = Arc::new(MockDestination::default());
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await
            .unwrap();
        let record = wait_terminal(&orchestrator, &user_id, &record.id).await;
        assert_eq!(record.status, TransferStatus::Completed);
        assert_eq!(record.total_tracks, 2);
        assert_eq!(record.completed_tracks, 0);
        assert_eq!(record.failed_tracks, 2);
        assert_eq!(destination.create_calls.load(Ordering::SeqCst), 0);
        assert!(destination.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn playlist_creation_failure_fails_the_transfer() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, true, true);
        let source =
            MockSource::with_playlist("Road Trip", vec![track("Karma Police", "Radiohead")]);
        let destination = Arc::new(MockDestination {
            fail_playlist_creation: true,
            ..MockDestination::default()
        });
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await
            .unwrap();
        let record = wait_terminal(&orchestrator, &user_id, &record.id).await;
        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.total_tracks, 1);
        assert_eq!(record.completed_tracks, 0);
        assert_eq!(record.failed_tracks, 0);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("failed to create destination playlist"));
        assert!(destination.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enumeration_auth_failure_fails_the_transfer() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        // No refresh token stored, so the expired source auth cannot recover.
        let user_id = seed_user(&users, true, false);
        let mut source = MockSource::with_playlist("Road Trip", vec![track("Song", "Band")]);
        source.fail_listing_with_auth = true;
        let destination = Arc::new(MockDestination::default());
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await
            .unwrap();
        let record = wait_terminal(&orchestrator, &user_id, &record.id).await;
        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.total_tracks, 0);
        assert_eq!(record.completed_tracks, 0);
        assert_eq!(record.failed_tracks, 0);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("failed to list source playlists"));
    }

    #[tokio::test]
    async fn rate_limited_searches_fail_tracks_after_bounded_retries() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, true, true);
        let source = MockSource::with_playlist(
            "Road Trip",
            vec![
                track("Song One", "Band"),
                track("Song Two", "Band"),
                track("Song Three", "Band"),
                track("Song Four", "Band"),
                track("Song Five", "Band"),
            ],
        );
        let destination = Arc::new(MockDestination {
            rate_limit_searches: true,
            ..MockDestination::default()
        });
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await
            .unwrap();
        let record = wait_terminal(&orchestrator, &user_id, &record.id).await;
        assert_eq!(record.status, TransferStatus::Completed);
        assert_eq!(record.total_tracks, 5);
        assert_eq!(record.completed_tracks, 0);
        assert_eq!(record.failed_tracks, 5);
        // Every track ran its full retry budget.
        assert_eq!(destination.search_calls.load(Ordering::SeqCst), 5 * 3);
    }

    #[tokio::test]
    async fn expired_destination_token_is_refreshed_once_mid_run() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, true, true);
        let source = MockSource::with_playlist(
            "Road Trip",
            vec![track("Song One", "Band"), track("Song Two", "Band")],
        );
        let destination = Arc::new(MockDestination {
            auth_expired_searches_before_refresh: true,
            ..MockDestination::default()
        });
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await
            .unwrap();
        let record = wait_terminal(&orchestrator, &user_id, &record.id).await;
        assert_eq!(record.status, TransferStatus::Completed);
        assert_eq!(record.completed_tracks, 2);
        assert_eq!(record.failed_tracks, 0);
        assert_eq!(destination.token_generation.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_is_scoped_to_the_owning_user() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, true, true);
        let other_user_id = seed_user(&users, false, false);
        let source =
            MockSource::with_playlist("Road Trip", vec![track("Karma Police", "Radiohead")]);
        let destination = Arc::new(MockDestination::default());
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await
            .unwrap();
        wait_terminal(&orchestrator, &user_id, &record.id).await;

        assert!(orchestrator
            .transfer_status(&other_user_id, &record.id)
            .unwrap()
            .is_none());
        assert!(orchestrator
            .transfer_status(&user_id, "no-such-transfer")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn start_rejects_empty_playlists_unknown_users_and_missing_logins() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, false, false);
        let source = MockSource::with_playlist("Road Trip", vec![]);
        let destination = Arc::new(MockDestination::default());
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let result = orchestrator.start_transfer(&user_id, vec![]).await;
        assert!(matches!(result, Err(TransferStartError::Validation(_))));

        let result = orchestrator
            .start_transfer("ghost", vec!["p1".to_string()])
            .await;
        assert!(matches!(result, Err(TransferStartError::UnknownUser(_))));

        let result = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string()])
            .await;
        assert!(matches!(
            result,
            Err(TransferStartError::NotLoggedIn(PlatformKind::Spotify))
        ));
    }

    #[tokio::test]
    async fn unknown_source_playlist_fails_the_transfer() {
        let users = Arc::new(SqliteUserStore::in_memory().unwrap());
        let user_id = seed_user(&users, true, true);
        let source = MockSource::with_playlist("Road Trip", vec![track("Song", "Band")]);
        let destination = Arc::new(MockDestination::default());
        let orchestrator = orchestrator(source, Arc::clone(&destination), users);

        let record = orchestrator
            .start_transfer(&user_id, vec!["p1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        let record = wait_terminal(&orchestrator, &user_id, &record.id).await;
        assert_eq!(record.status, TransferStatus::Failed);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("missing"));
    }
}
