use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::error;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::requests_logging::{log_requests, RequestsLoggingLevel};
use super::state::*;
use crate::config::TransferSettings;
use crate::platform::{
    DestinationPlatform, DevicePollResult, PlatformError, SourcePlatform,
};
use crate::transfer::{TransferOrchestrator, TransferRecordStore, TransferStartError};
use crate::user::{valid_access_token, UserProfileInput, UserStore, UserStoreError};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize)]
struct LoginUrlResponse {
    url: String,
}

#[derive(Serialize)]
struct LoggedInResponse {
    is_logged_in: bool,
}

#[derive(Deserialize)]
struct SpotifyCallbackBody {
    user_id: String,
    code: String,
}

#[derive(Deserialize)]
struct PollTokenBody {
    user_id: String,
    device_code: String,
}

#[derive(Serialize)]
struct PollTokenResponse {
    status: &'static str,
}

#[derive(Deserialize)]
struct TransferStartBody {
    user_id: String,
    playlist_ids: Vec<String>,
}

#[derive(Serialize)]
struct TransferStartResponse {
    transfer_id: String,
}

#[derive(Deserialize)]
struct TransferStatusBody {
    user_id: String,
    transfer_id: String,
}

fn store_error_response(err: UserStoreError) -> Response {
    match err {
        UserStoreError::UnknownUser(_) => StatusCode::NOT_FOUND.into_response(),
        UserStoreError::Internal(e) => {
            error!("User store error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn platform_error_response(what: &str, err: PlatformError) -> Response {
    match err {
        PlatformError::AuthExpired => StatusCode::UNAUTHORIZED.into_response(),
        PlatformError::RateLimited { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "upstream rate limit").into_response()
        }
        PlatformError::Platform(msg) => {
            error!("{} failed: {}", what, msg);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Ok(true) when the user exists.
fn user_exists(user_store: &GuardedUserStore, user_id: &str) -> Result<bool, Response> {
    match user_store.get_user(user_id) {
        Ok(user) => Ok(user.is_some()),
        Err(e) => Err(store_error_response(e)),
    }
}

async fn source_access_token(state: &ServerState, user_id: &str) -> Option<String> {
    let source = state.source.clone();
    valid_access_token(
        state.user_store.as_ref(),
        user_id,
        source.kind(),
        |rt| async move { source.refresh_token(&rt).await },
    )
    .await
}

async fn destination_access_token(state: &ServerState, user_id: &str) -> Option<String> {
    let destination = state.destination.clone();
    valid_access_token(
        state.user_store.as_ref(),
        user_id,
        destination.kind(),
        |rt| async move { destination.refresh_token(&rt).await },
    )
    .await
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

async fn create_user(
    State(user_store): State<GuardedUserStore>,
    Json(body): Json<UserProfileInput>,
) -> Response {
    match user_store.create_user(body) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn list_users(State(user_store): State<GuardedUserStore>) -> Response {
    match user_store.list_users() {
        Ok(profiles) => Json(profiles).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn get_user(
    State(user_store): State<GuardedUserStore>,
    Path(user_id): Path<String>,
) -> Response {
    match user_store.get_user(&user_id) {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn update_user(
    State(user_store): State<GuardedUserStore>,
    Path(user_id): Path<String>,
    Json(body): Json<UserProfileInput>,
) -> Response {
    match user_store.update_user(&user_id, body) {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn delete_user(
    State(user_store): State<GuardedUserStore>,
    Path(user_id): Path<String>,
) -> Response {
    match user_store.delete_user(&user_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn spotify_login(
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Response {
    match user_exists(&state.user_store, &user_id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    }
    Json(LoginUrlResponse {
        url: state.source.authorize_url(),
    })
    .into_response()
}

async fn spotify_callback(
    State(state): State<ServerState>,
    Json(body): Json<SpotifyCallbackBody>,
) -> Response {
    match user_exists(&state.user_store, &body.user_id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    }
    let tokens = match state.source.exchange_code(&body.code).await {
        Ok(tokens) => tokens,
        Err(e) => return platform_error_response("Spotify code exchange", e),
    };
    match state
        .user_store
        .store_tokens(&body.user_id, state.source.kind(), &tokens)
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn spotify_logged_in(
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Response {
    match user_exists(&state.user_store, &user_id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    }
    let is_logged_in = source_access_token(&state, &user_id).await.is_some();
    Json(LoggedInResponse { is_logged_in }).into_response()
}

async fn spotify_playlists(
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Response {
    match user_exists(&state.user_store, &user_id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    }
    let Some(token) = source_access_token(&state, &user_id).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.source.list_playlists(&token).await {
        Ok(playlists) => Json(playlists).into_response(),
        Err(e) => platform_error_response("Spotify playlist listing", e),
    }
}

async fn ytmusic_login(
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Response {
    match user_exists(&state.user_store, &user_id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    }
    match state.destination.request_device_code().await {
        Ok(authorization) => Json(authorization).into_response(),
        Err(e) => platform_error_response("YouTube device code request", e),
    }
}

async fn ytmusic_poll_token(
    State(state): State<ServerState>,
    Json(body): Json<PollTokenBody>,
) -> Response {
    match user_exists(&state.user_store, &body.user_id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    }
    match state.destination.poll_device_token(&body.device_code).await {
        Ok(DevicePollResult::Authorized(tokens)) => {
            match state
                .user_store
                .store_tokens(&body.user_id, state.destination.kind(), &tokens)
            {
                Ok(()) => Json(PollTokenResponse {
                    status: "completed",
                })
                .into_response(),
                Err(e) => store_error_response(e),
            }
        }
        Ok(DevicePollResult::Pending) => (
            StatusCode::ACCEPTED,
            Json(PollTokenResponse { status: "pending" }),
        )
            .into_response(),
        Ok(DevicePollResult::Expired) => (
            StatusCode::BAD_REQUEST,
            Json(PollTokenResponse { status: "expired" }),
        )
            .into_response(),
        Err(e) => platform_error_response("YouTube device token poll", e),
    }
}

async fn ytmusic_logged_in(
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Response {
    match user_exists(&state.user_store, &user_id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(response) => return response,
    }
    let is_logged_in = destination_access_token(&state, &user_id).await.is_some();
    Json(LoggedInResponse { is_logged_in }).into_response()
}

async fn start_transfer(
    State(orchestrator): State<GuardedOrchestrator>,
    Json(body): Json<TransferStartBody>,
) -> Response {
    match orchestrator
        .start_transfer(&body.user_id, body.playlist_ids)
        .await
    {
        Ok(record) => (
            StatusCode::ACCEPTED,
            Json(TransferStartResponse {
                transfer_id: record.id,
            }),
        )
            .into_response(),
        Err(TransferStartError::Validation(msg)) => {
            (StatusCode::BAD_REQUEST, msg).into_response()
        }
        Err(TransferStartError::UnknownUser(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(TransferStartError::NotLoggedIn(platform)) => (
            StatusCode::UNAUTHORIZED,
            format!("not logged in on {}", platform),
        )
            .into_response(),
        Err(TransferStartError::Internal(e)) => {
            error!("Failed to start transfer: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn transfer_status(
    State(orchestrator): State<GuardedOrchestrator>,
    Json(body): Json<TransferStatusBody>,
) -> Response {
    match orchestrator.transfer_status(&body.user_id, &body.transfer_id) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to query transfer status: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_app(
    logging_level: RequestsLoggingLevel,
    user_store: Arc<dyn UserStore>,
    transfer_store: Arc<dyn TransferRecordStore>,
    source: Arc<dyn SourcePlatform>,
    destination: Arc<dyn DestinationPlatform>,
    transfer_settings: TransferSettings,
) -> Router {
    let orchestrator = Arc::new(TransferOrchestrator::new(
        transfer_store,
        user_store.clone(),
        source.clone(),
        destination.clone(),
        transfer_settings,
    ));
    let state = ServerState {
        logging_level,
        start_time: Instant::now(),
        user_store,
        source,
        destination,
        orchestrator,
        hash: env!("GIT_HASH").to_owned(),
    };

    let users_routes: Router = Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/{user_id}", get(get_user))
        .route("/{user_id}", put(update_user))
        .route("/{user_id}", delete(delete_user))
        .with_state(state.clone());

    let spotify_routes: Router = Router::new()
        .route("/login/{user_id}", get(spotify_login))
        .route("/callback", post(spotify_callback))
        .route("/logged-in/{user_id}", get(spotify_logged_in))
        .route("/playlists/{user_id}", get(spotify_playlists))
        .with_state(state.clone());

    let ytmusic_routes: Router = Router::new()
        .route("/login/{user_id}", get(ytmusic_login))
        .route("/poll-token", post(ytmusic_poll_token))
        .route("/logged-in/{user_id}", get(ytmusic_logged_in))
        .with_state(state.clone());

    let transfer_routes: Router = Router::new()
        .route("/start", post(start_transfer))
        .route("/status", post(transfer_status))
        .with_state(state.clone());

    Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/v1/users", users_routes)
        .nest("/v1/spotify", spotify_routes)
        .nest("/v1/ytmusic", ytmusic_routes)
        .nest("/v1/transfer", transfer_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    user_store: Arc<dyn UserStore>,
    transfer_store: Arc<dyn TransferRecordStore>,
    source: Arc<dyn SourcePlatform>,
    destination: Arc<dyn DestinationPlatform>,
    transfer_settings: TransferSettings,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
) -> Result<()> {
    let app = make_app(
        requests_logging_level,
        user_store,
        transfer_store,
        source,
        destination,
        transfer_settings,
    );

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}
