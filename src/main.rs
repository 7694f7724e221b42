use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
use config::{AppConfig, CliConfig, FileConfig};

mod platform;
use platform::{SpotifyClient, YtMusicClient};

mod server;
use server::{run_server, RequestsLoggingLevel};

mod sqlite_persistence;

mod transfer;
use transfer::SqliteTransferRecordStore;

mod user;
use user::SqliteUserStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the TOML configuration file holding the platform credentials.
    #[clap(value_parser = parse_path)]
    pub config: PathBuf,

    /// Directory for the SQLite databases. Can also be set in the config file.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = FileConfig::load(&cli_args.config)?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite databases in {:?}...", config.db_dir);
    let user_store = Arc::new(SqliteUserStore::new(&config.db_dir)?);
    let transfer_store = Arc::new(SqliteTransferRecordStore::new(&config.db_dir)?);

    let timeout = Duration::from_secs(config.transfer.request_timeout_secs);
    let source = Arc::new(SpotifyClient::new(
        config.spotify.clone(),
        config.transfer.source_page_size,
        timeout,
    )?);
    let destination = Arc::new(YtMusicClient::new(
        config.ytmusic.clone(),
        config.transfer.search_max_results,
        timeout,
    )?);

    info!("Server starting on port {}...", config.port);
    run_server(
        user_store,
        transfer_store,
        source,
        destination,
        config.transfer.clone(),
        config.logging_level.clone(),
        config.port,
    )
    .await
}
