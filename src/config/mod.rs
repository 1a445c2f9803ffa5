//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "diramo";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3100;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_QUEUE_BATCH_SIZE: u32 = 20;
const DEFAULT_STALE_AFTER_SECS: u64 = 600;
const DEFAULT_CHANNEL_TIMEOUT_SECS: u64 = 15;

/// Command-line arguments for the diramo binary.
#[derive(Debug, Parser)]
#[command(name = "diramo", version, about = "diramo distribution engine")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DIRAMO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the distribution engine HTTP service and queue processor.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the queue polling cadence.
    #[arg(long = "queue-poll-interval-seconds", value_name = "SECONDS")]
    pub queue_poll_interval_seconds: Option<u64>,

    /// Override the per-cycle claim batch size.
    #[arg(long = "queue-batch-size", value_name = "COUNT")]
    pub queue_batch_size: Option<u32>,

    /// Override the stale-processing reclaim threshold.
    #[arg(long = "queue-stale-after-seconds", value_name = "SECONDS")]
    pub queue_stale_after_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub queue: QueueSettings,
    pub sync: SyncSettings,
    pub cron: CronSettings,
    pub channels: ChannelsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub stale_after: Duration,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// HMAC secret for inbound webhooks. Absent means verification is
    /// disabled, which is accepted but logged as an operational risk.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Shared secret expected in `x-cron-secret` on trigger requests.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelsSettings {
    pub hashnode: Option<HashnodeSettings>,
    pub devto: Option<DevtoSettings>,
    pub twitter: Option<TwitterSettings>,
    pub linkedin: Option<LinkedinSettings>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashnodeSettings {
    pub token: String,
    pub publication_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevtoSettings {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterSettings {
    pub bearer_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedinSettings {
    pub access_token: String,
    pub author_urn: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl LoadError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DIRAMO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    queue: RawQueueSettings,
    sync: RawSyncSettings,
    cron: RawCronSettings,
    channels: RawChannelsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(count) = overrides.database_max_connections {
            self.database.max_connections = Some(count);
        }
        if let Some(seconds) = overrides.queue_poll_interval_seconds {
            self.queue.poll_interval_seconds = Some(seconds);
        }
        if let Some(count) = overrides.queue_batch_size {
            self.queue.batch_size = Some(count);
        }
        if let Some(seconds) = overrides.queue_stale_after_seconds {
            self.queue.stale_after_seconds = Some(seconds);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQueueSettings {
    poll_interval_seconds: Option<u64>,
    batch_size: Option<u32>,
    stale_after_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCronSettings {
    secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawChannelsSettings {
    hashnode: Option<HashnodeSettings>,
    devto: Option<DevtoSettings>,
    twitter: Option<TwitterSettings>,
    linkedin: Option<LinkedinSettings>,
    request_timeout_seconds: Option<u64>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let host = raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = raw.server.port.unwrap_or(DEFAULT_PORT);
        let addr = SocketAddr::from_str(&format!("{host}:{port}"))
            .map_err(|err| LoadError::invalid("server.host", err.to_string()))?;

        let graceful_secs = raw
            .server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
        if graceful_secs == 0 {
            return Err(LoadError::invalid(
                "server.graceful_shutdown_seconds",
                "must be greater than zero",
            ));
        }

        let level = match raw.logging.level {
            Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
                LoadError::invalid("logging.level", format!("failed to parse: {err}"))
            })?,
            None => LevelFilter::INFO,
        };
        let format = if raw.logging.json.unwrap_or(false) {
            LogFormat::Json
        } else {
            LogFormat::Compact
        };

        let url = raw.database.url.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let poll_secs = raw
            .queue
            .poll_interval_seconds
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_secs == 0 {
            return Err(LoadError::invalid(
                "queue.poll_interval_seconds",
                "must be greater than zero",
            ));
        }
        let batch_size = raw.queue.batch_size.unwrap_or(DEFAULT_QUEUE_BATCH_SIZE);
        if batch_size == 0 {
            return Err(LoadError::invalid(
                "queue.batch_size",
                "must be greater than zero",
            ));
        }

        let webhook_secret = raw.sync.webhook_secret.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });
        let cron_secret = raw.cron.secret.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        Ok(Settings {
            server: ServerSettings {
                addr,
                graceful_shutdown: Duration::from_secs(graceful_secs),
            },
            logging: LoggingSettings { level, format },
            database: DatabaseSettings {
                url,
                max_connections: raw
                    .database
                    .max_connections
                    .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            },
            queue: QueueSettings {
                poll_interval: Duration::from_secs(poll_secs),
                batch_size,
                stale_after: Duration::from_secs(
                    raw.queue
                        .stale_after_seconds
                        .unwrap_or(DEFAULT_STALE_AFTER_SECS),
                ),
            },
            sync: SyncSettings { webhook_secret },
            cron: CronSettings {
                secret: cron_secret,
            },
            channels: ChannelsSettings {
                hashnode: raw.channels.hashnode,
                devto: raw.channels.devto,
                twitter: raw.channels.twitter,
                linkedin: raw.channels.linkedin,
                request_timeout_secs: raw
                    .channels
                    .request_timeout_seconds
                    .unwrap_or(DEFAULT_CHANNEL_TIMEOUT_SECS),
            },
        })
    }
}
