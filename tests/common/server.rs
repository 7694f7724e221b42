//! Test server lifecycle management
//!
//! Each test gets an isolated server on a random port with its own databases
//! in a temporary directory and mock platform clients.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use chrono::Utc;
use portify_transfer_server::config::TransferSettings;
use portify_transfer_server::platform::{PlatformKind, TokenSet};
use portify_transfer_server::server::{make_app, RequestsLoggingLevel};
use portify_transfer_server::transfer::SqliteTransferRecordStore;
use portify_transfer_server::user::{SqliteUserStore, UserProfileInput, UserStore};

use super::mock::{MockSpotify, MockYtMusic};

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub port: u16,

    /// User store for direct database access in tests
    pub user_store: Arc<SqliteUserStore>,

    /// The mock destination, for asserting on created playlists and tracks
    pub destination: Arc<MockYtMusic>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port.
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp db dir");

        let user_store =
            Arc::new(SqliteUserStore::new(temp_db_dir.path()).expect("Failed to open user store"));
        let transfer_store = Arc::new(
            SqliteTransferRecordStore::new(temp_db_dir.path())
                .expect("Failed to open transfer store"),
        );
        let source = Arc::new(MockSpotify::with_default_catalog());
        let destination = Arc::new(MockYtMusic::default());

        // Small backoffs so rate-limit paths stay fast in tests.
        let settings = TransferSettings {
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            ..TransferSettings::default()
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = make_app(
            RequestsLoggingLevel::None,
            user_store.clone(),
            transfer_store,
            source,
            destination.clone(),
            settings,
        );

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            user_store,
            destination,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if let Ok(response) = client.get(&self.base_url).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Server did not become ready at {}", self.base_url);
    }

    /// Creates a user without any platform tokens.
    pub fn seed_user(&self, name: &str) -> String {
        self.user_store
            .create_user(UserProfileInput {
                id: None,
                name: name.to_string(),
                email: None,
            })
            .expect("Failed to create test user")
            .id
    }

    /// Creates a user with fresh tokens for both platforms.
    pub fn seed_logged_in_user(&self, name: &str) -> String {
        let user_id = self.seed_user(name);
        let expires_at = Utc::now().timestamp() + 3600;
        for platform in [PlatformKind::Spotify, PlatformKind::YtMusic] {
            self.user_store
                .store_tokens(
                    &user_id,
                    platform,
                    &TokenSet {
                        access_token: format!("{}-access-token", platform),
                        refresh_token: Some(format!("{}-refresh-token", platform)),
                        expires_at,
                    },
                )
                .expect("Failed to seed tokens");
        }
        user_id
    }
}
