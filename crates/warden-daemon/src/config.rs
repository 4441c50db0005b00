//! Configuration for warden-daemon

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_monitor::canvas::{DEFAULT_PIXEL_URL, DEFAULT_TILE_URL};
use warden_monitor::commands::DEFAULT_PREFIX;
use warden_monitor::{CanvasEndpoints, MonitorConfig};
use warden_types::{ChannelId, PixelOffset, TileRegion};

use crate::error::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Watched canvas tile and backend endpoints
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// Reference template
    #[serde(default)]
    pub template: TemplateConfig,

    /// Monitor loop settings
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Discord notifier settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Ledger storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Operator REST API
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Canvas configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Tile column
    #[serde(default)]
    pub tile_x: u32,

    /// Tile row
    #[serde(default)]
    pub tile_y: u32,

    /// Tile URL template (`{tx}`, `{ty}`)
    #[serde(default = "default_tile_url")]
    pub tile_url: String,

    /// Pixel ownership URL template (`{tx}`, `{ty}`, `{x}`, `{y}`)
    #[serde(default = "default_pixel_url")]
    pub pixel_url: String,

    /// Timeout for each canvas request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent ownership lookups
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,

    /// User-Agent header sent to the canvas
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            tile_x: 0,
            tile_y: 0,
            tile_url: default_tile_url(),
            pixel_url: default_pixel_url(),
            request_timeout_secs: default_request_timeout(),
            lookup_concurrency: default_lookup_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

/// Template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Template PNG path
    #[serde(default)]
    pub path: PathBuf,

    /// Template left edge inside the tile
    #[serde(default)]
    pub offset_x: i64,

    /// Template top edge inside the tile
    #[serde(default)]
    pub offset_y: i64,
}

/// Monitor loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Seconds between cycle starts
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Skip ledger updates on the first cycle with mismatches
    #[serde(default = "default_true")]
    pub suppress_first_cycle: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            suppress_first_cycle: true,
        }
    }
}

/// Notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Bot token
    #[serde(default)]
    pub token: Option<String>,

    /// Broadcast channels
    #[serde(default)]
    pub channels: Vec<ChannelId>,

    /// Discord REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Seconds between command polls
    #[serde(default = "default_command_poll_interval")]
    pub command_poll_interval_secs: u64,

    /// Command prefix
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            token: None,
            channels: Vec::new(),
            api_base: default_api_base(),
            command_poll_interval_secs: default_command_poll_interval(),
            command_prefix: default_command_prefix(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Ledger file
    #[serde(default = "default_stats_path")]
    pub stats_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            stats_path: default_stats_path(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Serve the operator API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_tile_url() -> String {
    DEFAULT_TILE_URL.to_string()
}

fn default_pixel_url() -> String {
    DEFAULT_PIXEL_URL.to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_lookup_concurrency() -> usize {
    8
}

fn default_user_agent() -> String {
    concat!("pixel-warden/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_tick_interval() -> u64 {
    10
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_command_poll_interval() -> u64 {
    5
}

fn default_command_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_stats_path() -> PathBuf {
    PathBuf::from("user_stats.json")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8090))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then `WARDEN__*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // WARDEN__NOTIFIER__TOKEN, WARDEN__CANVAS__TILE_X, ...
        builder = builder.add_source(
            config::Environment::with_prefix("WARDEN")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("notifier.channels")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self, dry_run: bool) -> DaemonResult<()> {
        if self.template.path.as_os_str().is_empty() {
            return Err(DaemonError::Config("template.path is required".to_string()));
        }
        if self.monitor.tick_interval_secs == 0 {
            return Err(DaemonError::Config(
                "monitor.tick_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.canvas.request_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "canvas.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.canvas.lookup_concurrency == 0 {
            return Err(DaemonError::Config(
                "canvas.lookup_concurrency must be at least 1".to_string(),
            ));
        }
        if self.notifier.channels.is_empty() {
            return Err(DaemonError::Config(
                "notifier.channels must name at least one channel".to_string(),
            ));
        }
        if self.notifier.command_poll_interval_secs == 0 {
            return Err(DaemonError::Config(
                "notifier.command_poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if !dry_run && self.token().is_none() {
            return Err(DaemonError::Config(
                "notifier.token is required unless running with --dry-run".to_string(),
            ));
        }
        Ok(())
    }

    /// The bot token, if one is set and non-blank.
    pub fn token(&self) -> Option<&str> {
        self.notifier
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            region: TileRegion::new(self.canvas.tile_x, self.canvas.tile_y),
            offset: PixelOffset::new(self.template.offset_x, self.template.offset_y),
            tick_interval: Duration::from_secs(self.monitor.tick_interval_secs),
            request_timeout: Duration::from_secs(self.canvas.request_timeout_secs),
            lookup_concurrency: self.canvas.lookup_concurrency,
            suppress_first_cycle: self.monitor.suppress_first_cycle,
        }
    }

    pub fn canvas_endpoints(&self) -> CanvasEndpoints {
        CanvasEndpoints {
            tile_url: self.canvas.tile_url.clone(),
            pixel_url: self.canvas.pixel_url.clone(),
            user_agent: self.canvas.user_agent.clone(),
            timeout: Duration::from_secs(self.canvas.request_timeout_secs),
        }
    }

    pub fn command_poll_interval(&self) -> Duration {
        Duration::from_secs(self.notifier.command_poll_interval_secs)
    }
}
