mod file_config;

pub use file_config::{FileConfig, PlatformCredentialsConfig, TransferConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that participate in config resolution.
/// Mirrors the CLI fields that a TOML config file can override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub transfer: TransferSettings,
    pub spotify: PlatformCredentials,
    pub ytmusic: PlatformCredentials,
}

/// Tuning knobs for the transfer orchestrator and platform clients.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Page size for source playlist/track listing.
    pub source_page_size: u32,
    /// How many search results to consider per track.
    pub search_max_results: u32,
    /// Token-overlap threshold for the matcher (0.0-1.0).
    pub match_threshold: f64,
    /// Total attempts per rate-limited call (first try included).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// How many track outcomes to buffer before persisting counters.
    pub progress_batch_size: u32,
    /// Timeout for each outbound HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            source_page_size: 50,
            search_max_results: 10,
            match_threshold: 0.5,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 15_000,
            backoff_multiplier: 2.0,
            progress_batch_size: 1,
            request_timeout_secs: 30,
        }
    }
}

/// OAuth client credentials for one platform.
///
/// These come from the TOML config file; there is no process-wide credential
/// cache, each client owns its own copy.
#[derive(Debug, Clone)]
pub struct PlatformCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
}

impl PlatformCredentials {
    fn resolve(section: Option<PlatformCredentialsConfig>, name: &str) -> Result<Self> {
        let section = section.unwrap_or_default();
        let client_id = match section.client_id {
            Some(id) if !id.is_empty() => id,
            _ => bail!("Missing client_id in [{}] config section", name),
        };
        let client_secret = match section.client_secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => bail!("Missing client_secret in [{}] config section", name),
        };
        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: section.redirect_uri,
            scope: section.scope,
        })
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and a TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: FileConfig) -> Result<Self> {
        let db_dir = file_config
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in the config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file_config.port.unwrap_or(cli.port);

        let logging_level = file_config
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let t = file_config.transfer.unwrap_or_default();
        let defaults = TransferSettings::default();
        let transfer = TransferSettings {
            source_page_size: t.source_page_size.unwrap_or(defaults.source_page_size),
            search_max_results: t.search_max_results.unwrap_or(defaults.search_max_results),
            match_threshold: t.match_threshold.unwrap_or(defaults.match_threshold),
            max_attempts: t.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff_ms: t.initial_backoff_ms.unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: t.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: t.backoff_multiplier.unwrap_or(defaults.backoff_multiplier),
            progress_batch_size: t.progress_batch_size.unwrap_or(defaults.progress_batch_size),
            request_timeout_secs: t
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        };
        if !(0.0..=1.0).contains(&transfer.match_threshold) {
            bail!(
                "transfer.match_threshold must be between 0.0 and 1.0, got {}",
                transfer.match_threshold
            );
        }
        if transfer.max_attempts == 0 {
            bail!("transfer.max_attempts must be at least 1");
        }
        if transfer.source_page_size == 0 {
            bail!("transfer.source_page_size must be at least 1");
        }

        let spotify = PlatformCredentials::resolve(file_config.spotify, "spotify")?;
        let ytmusic = PlatformCredentials::resolve(file_config.ytmusic, "ytmusic")?;

        Ok(Self {
            db_dir,
            port,
            logging_level,
            transfer,
            spotify,
            ytmusic,
        })
    }
}
