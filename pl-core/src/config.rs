//! Application configuration management.
//!
//! Handles loading, saving, and accessing client configuration including
//! server URL, user identity, connection tuning, and notification
//! preferences. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{PlError, PlResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Connection-layer tuning (timeouts, backoff, transport probing).
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Notification settings.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server origin (e.g., "https://assess.example.com").
    #[serde(default)]
    pub address: String,

    /// User identifier sent in the post-handshake auth message.
    /// 0 means unauthenticated.
    #[serde(default)]
    pub user_id: u64,

    /// Display name sent alongside the user identifier.
    #[serde(default)]
    pub user_name: String,

    /// Whether to accept self-signed TLS certificates from the server.
    #[serde(default)]
    pub accept_self_signed_certs: bool,
}

/// Connection-layer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Handshake timeout in milliseconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Heartbeat ping interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Timeout for each heartbeat pong response in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,

    /// Bound on the offline send queue; oldest messages drop on overflow.
    #[serde(default = "default_send_queue_limit")]
    pub send_queue_limit: usize,

    /// Reconnection backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectSettings,

    /// Transport probe settings.
    #[serde(default)]
    pub probe: ProbeSettings,
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// Base delay between reconnection attempts in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub base_delay_ms: u64,

    /// Maximum delay cap for exponential backoff in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub max_delay_ms: u64,

    /// Maximum number of automatic reconnection attempts (0 = unlimited).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Jitter fraction (0.0 to 1.0) applied to each delay.
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

/// Transport probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Rolling window for counting consecutive socket failures, in milliseconds.
    #[serde(default = "default_probe_window")]
    pub failure_window_ms: u64,

    /// Number of attempts to stay on long-poll after escalation.
    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,

    /// Cool-down before retrying the native socket, in milliseconds.
    #[serde(default = "default_probe_cooldown")]
    pub cooldown_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Show a desktop notification when connectivity degrades.
    #[serde(default = "default_true")]
    pub notify_on_degrade: bool,

    /// Auto-hide delay after connectivity is restored, in milliseconds.
    #[serde(default = "default_auto_hide")]
    pub auto_hide_ms: u64,
}

// Default value functions for serde

fn default_handshake_timeout() -> u64 {
    constants::DEFAULT_HANDSHAKE_TIMEOUT_MS
}

fn default_heartbeat_interval() -> u64 {
    constants::DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_heartbeat_timeout() -> u64 {
    constants::DEFAULT_HEARTBEAT_TIMEOUT_MS
}

fn default_send_queue_limit() -> usize {
    constants::DEFAULT_SEND_QUEUE_LIMIT
}

fn default_backoff_base() -> u64 {
    constants::DEFAULT_BACKOFF_BASE_MS
}

fn default_backoff_max() -> u64 {
    constants::DEFAULT_BACKOFF_MAX_MS
}

fn default_max_attempts() -> u32 {
    constants::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_jitter_fraction() -> f64 {
    constants::DEFAULT_JITTER_FRACTION
}

fn default_probe_window() -> u64 {
    constants::DEFAULT_PROBE_WINDOW_MS
}

fn default_fallback_attempts() -> u32 {
    constants::DEFAULT_FALLBACK_ATTEMPTS
}

fn default_probe_cooldown() -> u64 {
    constants::DEFAULT_PROBE_COOLDOWN_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_auto_hide() -> u64 {
    constants::DEFAULT_NOTIFICATION_AUTO_HIDE_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            connection: ConnectionConfig::default(),
            logging: LoggingConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            user_id: 0,
            user_name: String::new(),
            accept_self_signed_certs: false,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
            send_queue_limit: default_send_queue_limit(),
            reconnect: ReconnectSettings::default(),
            probe: ProbeSettings::default(),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_backoff_base(),
            max_delay_ms: default_backoff_max(),
            max_attempts: default_max_attempts(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            failure_window_ms: default_probe_window(),
            fallback_attempts: default_fallback_attempts(),
            cooldown_ms: default_probe_cooldown(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notify_on_degrade: true,
            auto_hide_ms: default_auto_hide(),
        }
    }
}

impl ConnectionConfig {
    /// Handshake timeout as a Duration.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Heartbeat interval as a Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat pong timeout as a Duration.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> PlResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> PlResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> PlResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> PlResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PlError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PlResult<PathBuf> {
        let config_dir = Platform::config_dir()?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> PlResult<PathBuf> {
        if self.logging.directory.is_empty() {
            let data_dir = Platform::data_dir()?;
            Ok(data_dir.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether the server connection is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.address.is_empty()
    }

    /// Sanitize and normalize a server address.
    ///
    /// Ensures the address has a scheme and strips trailing slashes.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else if trimmed.contains("ngrok.io") || trimmed.contains("trycloudflare.com") {
            format!("https://{trimmed}")
        } else {
            format!("http://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }

    /// Derive the native socket URL from the server origin.
    ///
    /// Swaps `http(s)` for `ws(s)` and appends the fixed socket path.
    pub fn websocket_url(&self) -> PlResult<String> {
        let origin = &self.server.address;
        if origin.is_empty() {
            return Err(PlError::MissingConfig("server address".into()));
        }
        let ws_origin = if let Some(rest) = origin.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = origin.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(PlError::Config(format!("server address has no scheme: {origin}")));
        };
        Ok(format!("{ws_origin}{}", constants::SOCKET_PATH))
    }

    /// Derive the long-poll fallback URL from the server origin.
    ///
    /// Keeps the `http(s)` scheme and adds the polling handshake query.
    pub fn polling_url(&self) -> PlResult<String> {
        let origin = &self.server.address;
        if origin.is_empty() {
            return Err(PlError::MissingConfig("server address".into()));
        }
        Ok(format!(
            "{origin}{}?EIO={}&transport=polling",
            constants::SOCKET_PATH,
            constants::POLLING_PROTOCOL_VERSION,
        ))
    }
}

/// Thread-safe configuration holder for shared access across components.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Save the current configuration to disk.
    pub async fn save(&self) -> PlResult<()> {
        let config = self.inner.read().await;
        config.save_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.connection.handshake_timeout_ms, 10_000);
        assert_eq!(config.connection.reconnect.max_attempts, 10);
        assert_eq!(config.logging.level, "info");
        assert!(!config.is_server_configured());
    }

    #[test]
    fn test_sanitize_server_address() {
        assert_eq!(
            AppConfig::sanitize_server_address("abc123.trycloudflare.com"),
            "https://abc123.trycloudflare.com"
        );
        assert_eq!(
            AppConfig::sanitize_server_address("http://192.168.1.100:1234/"),
            "http://192.168.1.100:1234"
        );
        assert_eq!(
            AppConfig::sanitize_server_address("  \"https://example.com/\"  "),
            "https://example.com"
        );
        assert_eq!(
            AppConfig::sanitize_server_address("192.168.1.5:1234"),
            "http://192.168.1.5:1234"
        );
    }

    #[test]
    fn test_websocket_url_derivation() {
        let mut config = AppConfig::default();
        config.server.address = "https://assess.example.com".into();
        assert_eq!(config.websocket_url().unwrap(), "wss://assess.example.com/ws");

        config.server.address = "http://localhost:5000".into();
        assert_eq!(config.websocket_url().unwrap(), "ws://localhost:5000/ws");
    }

    #[test]
    fn test_websocket_url_requires_address() {
        let config = AppConfig::default();
        assert!(matches!(
            config.websocket_url(),
            Err(PlError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_polling_url_derivation() {
        let mut config = AppConfig::default();
        config.server.address = "https://assess.example.com".into();
        assert_eq!(
            config.polling_url().unwrap(),
            "https://assess.example.com/ws?EIO=4&transport=polling"
        );
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            deserialized.connection.heartbeat_interval_ms,
            config.connection.heartbeat_interval_ms
        );
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.server.address = "https://assess.example.com".into();
        config.server.user_id = 42;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.address, "https://assess.example.com");
        assert_eq!(loaded.server.user_id, 42);
    }
}
