//! Configuration loading from file and environment variables.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use brokerlog_db::DbRuntimeSettings;
use brokerlog_textlog::RotatingLogConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::{Credential, CredentialError, Credentials};
use crate::session::DEFAULT_MAX_SESSIONS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Event hook listener settings.
    #[serde(default)]
    pub hook: HookConfig,

    /// Rotating text log settings.
    #[serde(default)]
    pub textlog: TextLogConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Session tracking settings.
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Broker client credential list.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Process diagnostics settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener the broker engine delivers lifecycle events to.
#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Rotating text log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TextLogConfig {
    /// Set to `false` to disable the text log entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for the active file and archives.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Active file name.
    #[serde(default = "default_log_file")]
    pub file: String,

    /// Rotation threshold in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Number of archives kept.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Seconds before an idle pooled connection is closed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Session tracker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on tracked client sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

/// Broker client authentication.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Accepted username/password pairs. Empty disables authentication.
    #[serde(default)]
    pub users: Vec<Credential>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "brokerlog_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    1884
}

fn default_true() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_file() -> String {
    "mqtt-broker.log".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_max_files() -> usize {
    5
}

fn default_db_path() -> String {
    "broker_logs.db".to_string()
}

fn default_pool_max_size() -> u32 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TextLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_log_dir(),
            file: default_log_file(),
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_max_size: default_pool_max_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl TextLogConfig {
    /// Rotation settings for the text logger.
    pub fn rotating(&self) -> RotatingLogConfig {
        RotatingLogConfig {
            dir: self.dir.clone(),
            file_name: self.file.clone(),
            max_file_size: self.max_file_size,
            max_files: self.max_files,
        }
    }
}

impl DatabaseConfig {
    /// Pool settings for the store.
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

impl AuthConfig {
    /// The configured credential list.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.users.clone())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A configuration problem resolved by keeping a default.
///
/// Loading happens before diagnostics are installed, so these are returned
/// to the caller and logged once a subscriber exists.
#[derive(Debug, Error)]
pub enum ConfigWarning {
    /// The configuration file does not exist.
    #[error("config file {path} not found, using defaults")]
    FileNotFound {
        /// Path that was tried.
        path: String,
    },

    /// An environment override did not parse and was ignored.
    #[error("ignoring unparseable {key}={value}")]
    Unparseable {
        /// Environment variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// A setting parsed but is out of range; the default is kept.
    #[error("{key}={value} is out of range ({reason}), using {fallback}")]
    OutOfRange {
        /// Setting or environment variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
        /// What a valid value looks like.
        reason: &'static str,
        /// Value used instead.
        fallback: String,
    },

    /// The credential list is malformed; authentication is disabled.
    #[error("cannot parse BROKERLOG_MQTT_USERS, authentication disabled: {0}")]
    Credentials(#[source] CredentialError),
}

impl ConfigWarning {
    /// Emits this warning through `tracing`.
    pub fn log(&self) {
        match self {
            Self::FileNotFound { path } => {
                tracing::info!(path = %path, "config file not found, using defaults");
            }
            other => tracing::warn!("{other}"),
        }
    }
}

/// Configuration together with the problems met while building it.
#[derive(Debug, Default)]
pub struct LoadedConfig {
    /// Effective configuration.
    pub config: Config,
    /// Settings that fell back to defaults.
    pub warnings: Vec<ConfigWarning>,
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `BROKERLOG_HOOK_HOST` / `BROKERLOG_HOOK_PORT` override `hook.host` / `hook.port`
/// - `BROKERLOG_TEXTLOG_ENABLED` overrides `textlog.enabled`
/// - `BROKERLOG_LOG_DIR` / `BROKERLOG_LOG_FILE` override `textlog.dir` / `textlog.file`
/// - `BROKERLOG_LOG_MAX_SIZE` / `BROKERLOG_LOG_MAX_FILES` override the rotation bounds
/// - `BROKERLOG_DB_PATH` overrides `database.path`
/// - `BROKERLOG_DB_POOL_SIZE` overrides `database.pool_max_size`
/// - `BROKERLOG_DB_IDLE_TIMEOUT` overrides `database.idle_timeout_secs`
/// - `BROKERLOG_DB_BUSY_TIMEOUT` overrides `database.busy_timeout_ms`
/// - `BROKERLOG_MAX_SESSIONS` overrides `sessions.max_sessions`
/// - `BROKERLOG_MQTT_USERS` replaces `auth.users` with a JSON list of
///   `{"u": ..., "p": ...}`; a malformed list disables authentication
/// - `BROKERLOG_LOG_LEVEL` overrides `logging.level`
/// - `BROKERLOG_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Override values that do not parse, and a zero pool size from either
/// source, are reported in [`LoadedConfig::warnings`] and otherwise ignored.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<LoadedConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with environment lookups routed through `var`.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config_with<F>(path: Option<&str>, var: F) -> Result<LoadedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut warnings = Vec::new();
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warnings.push(ConfigWarning::FileNotFound {
                    path: p.to_string(),
                });
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    warnings.extend(apply_env_overrides(&mut config, var));
    Ok(LoadedConfig { config, warnings })
}

/// Applies overrides looked up through `var`, then checks ranges.
///
/// Returns one warning per value that was rejected.
pub fn apply_env_overrides<F>(config: &mut Config, var: F) -> Vec<ConfigWarning>
where
    F: Fn(&str) -> Option<String>,
{
    let mut warnings = Vec::new();
    if let Some(host) = parse_var(&var, "BROKERLOG_HOOK_HOST", &mut warnings) {
        config.hook.host = host;
    }
    if let Some(port) = parse_var(&var, "BROKERLOG_HOOK_PORT", &mut warnings) {
        config.hook.port = port;
    }
    if let Some(size) = parse_var(&var, "BROKERLOG_LOG_MAX_SIZE", &mut warnings) {
        config.textlog.max_file_size = size;
    }
    if let Some(files) = parse_var(&var, "BROKERLOG_LOG_MAX_FILES", &mut warnings) {
        config.textlog.max_files = files;
    }
    if let Some(size) = parse_var(&var, "BROKERLOG_DB_POOL_SIZE", &mut warnings) {
        config.database.pool_max_size = size;
    }
    if let Some(secs) = parse_var(&var, "BROKERLOG_DB_IDLE_TIMEOUT", &mut warnings) {
        config.database.idle_timeout_secs = secs;
    }
    if let Some(ms) = parse_var(&var, "BROKERLOG_DB_BUSY_TIMEOUT", &mut warnings) {
        config.database.busy_timeout_ms = ms;
    }
    if let Some(max) = parse_var(&var, "BROKERLOG_MAX_SESSIONS", &mut warnings) {
        config.sessions.max_sessions = max;
    }

    if let Some(enabled) = var("BROKERLOG_TEXTLOG_ENABLED") {
        config.textlog.enabled = is_truthy(&enabled);
    }
    if let Some(dir) = var("BROKERLOG_LOG_DIR") {
        config.textlog.dir = PathBuf::from(dir);
    }
    if let Some(file) = var("BROKERLOG_LOG_FILE") {
        config.textlog.file = file;
    }
    if let Some(db_path) = var("BROKERLOG_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(users) = var("BROKERLOG_MQTT_USERS") {
        config.auth.users = match Credentials::from_json(&users) {
            Ok(credentials) => credentials.into_users(),
            Err(e) => {
                warnings.push(ConfigWarning::Credentials(e));
                Vec::new()
            }
        };
    }
    if let Some(level) = var("BROKERLOG_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("BROKERLOG_LOG_JSON") {
        config.logging.json = is_truthy(&json);
    }

    if config.database.pool_max_size == 0 {
        let fallback = default_pool_max_size();
        warnings.push(ConfigWarning::OutOfRange {
            key: "database.pool_max_size",
            value: "0".to_string(),
            reason: "must be at least 1",
            fallback: fallback.to_string(),
        });
        config.database.pool_max_size = fallback;
    }

    warnings
}

fn parse_var<F, T>(var: &F, key: &'static str, warnings: &mut Vec<ConfigWarning>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warnings.push(ConfigWarning::Unparseable { key, value: raw });
            None
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}
