//! Configuration system for the Driftchat client.
//!
//! Supports layered configuration with the following priority (highest
//! first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/driftchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use driftchat_proto::chunk::ChunkPolicy;

use crate::pipeline::PipelineConfig;
use crate::refresh::RefreshConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    chunking: ChunkingFileConfig,
    queue: QueueFileConfig,
    edit: EditFileConfig,
    read: ReadFileConfig,
    refresh: RefreshFileConfig,
    limits: LimitsFileConfig,
}

/// `[chunking]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChunkingFileConfig {
    threshold: Option<usize>,
    chunk_size: Option<usize>,
}

/// `[queue]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct QueueFileConfig {
    max_send_attempts: Option<u32>,
    event_buffer: Option<usize>,
}

/// `[edit]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EditFileConfig {
    window_secs: Option<u64>,
}

/// `[read]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReadFileConfig {
    fetch_limit: Option<usize>,
    store_self_copy: Option<bool>,
}

/// `[refresh]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RefreshFileConfig {
    interval_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

/// `[limits]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LimitsFileConfig {
    rate_window_secs: Option<u64>,
    rate_max_per_window: Option<u32>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Identity --
    /// Local user identity string.
    pub user: Option<String>,
    /// Default peer to converse with.
    pub peer: Option<String>,

    // -- Chunking --
    /// Content at or under this many characters stays a single row.
    pub chunk_threshold: usize,
    /// Maximum characters per fragment.
    pub chunk_size: usize,

    // -- Queue --
    /// Delivery attempts per queued entry before it is dropped.
    pub max_send_attempts: u32,
    /// Buffer size for the pipeline event channel.
    pub event_buffer: usize,

    // -- Edit --
    /// Edit window measured from the stored creation timestamp.
    pub edit_window: Duration,

    // -- Read --
    /// Bound on rows fetched per conversation read.
    pub fetch_limit: usize,
    /// Store a sender-addressed copy of every outgoing message.
    pub store_self_copy: bool,

    // -- Refresh --
    /// Base interval between scheduled refresh cues.
    pub refresh_interval: Duration,
    /// Uniform jitter added per refresh tick.
    pub refresh_jitter: Duration,

    // -- Limits --
    /// Fixed rate-limit window, when rate limiting is enabled.
    pub rate_window: Duration,
    /// Sends allowed per window; `None` disables rate limiting.
    pub rate_max_per_window: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user: None,
            peer: None,
            chunk_threshold: 1000,
            chunk_size: 800,
            max_send_attempts: 3,
            event_buffer: 64,
            edit_window: Duration::from_secs(5 * 60),
            fetch_limit: 200,
            store_self_copy: false,
            refresh_interval: Duration::from_millis(3000),
            refresh_jitter: Duration::from_millis(500),
            rate_window: Duration::from_secs(60),
            rate_max_per_window: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. If no `--config` is given, the default path
    /// (`~/.config/driftchat/config.toml`) is tried and silently ignored
    /// if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            user: cli.user.clone(),
            peer: cli.peer.clone(),
            chunk_threshold: file
                .chunking
                .threshold
                .unwrap_or(defaults.chunk_threshold),
            chunk_size: file.chunking.chunk_size.unwrap_or(defaults.chunk_size),
            max_send_attempts: file
                .queue
                .max_send_attempts
                .unwrap_or(defaults.max_send_attempts),
            event_buffer: file.queue.event_buffer.unwrap_or(defaults.event_buffer),
            edit_window: file
                .edit
                .window_secs
                .map_or(defaults.edit_window, Duration::from_secs),
            fetch_limit: file.read.fetch_limit.unwrap_or(defaults.fetch_limit),
            store_self_copy: file
                .read
                .store_self_copy
                .unwrap_or(defaults.store_self_copy),
            refresh_interval: file
                .refresh
                .interval_ms
                .map_or(defaults.refresh_interval, Duration::from_millis),
            refresh_jitter: file
                .refresh
                .jitter_ms
                .map_or(defaults.refresh_jitter, Duration::from_millis),
            rate_window: file
                .limits
                .rate_window_secs
                .map_or(defaults.rate_window, Duration::from_secs),
            rate_max_per_window: file
                .limits
                .rate_max_per_window
                .or(defaults.rate_max_per_window),
        }
    }

    /// Builds the pipeline tunables from this configuration.
    #[must_use]
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunk_policy: ChunkPolicy::new(self.chunk_threshold, self.chunk_size),
            max_send_attempts: self.max_send_attempts,
            fetch_limit: self.fetch_limit,
            edit_window: self.edit_window,
            store_self_copy: self.store_self_copy,
            event_buffer: self.event_buffer,
        }
    }

    /// Builds the refresh cadence from this configuration.
    #[must_use]
    pub const fn to_refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: self.refresh_interval,
            jitter: self.refresh_jitter,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Offline-tolerant chat delivery pipeline")]
pub struct CliArgs {
    /// Your local user identity string.
    #[arg(long, env = "DRIFTCHAT_USER")]
    pub user: Option<String>,

    /// Peer to converse with.
    #[arg(long, env = "DRIFTCHAT_PEER")]
    pub peer: Option<String>,

    /// Path to config file (default: `~/.config/driftchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DRIFTCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/driftchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("driftchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
