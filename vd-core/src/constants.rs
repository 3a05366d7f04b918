//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "Vidarr";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration file name under the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Log file name prefix for the daily-rotated file appender.
pub const LOG_FILE_NAME: &str = "vidarr.log";

/// Port a development server listens on.
pub const DEFAULT_DEV_PORT: u16 = 3011;

/// Server address used when none has been configured.
pub const DEFAULT_DEV_ADDRESS: &str = "http://localhost:3011";

/// Base delay for stream reconnection backoff in milliseconds.
pub const BACKOFF_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound for stream reconnection backoff in milliseconds.
pub const BACKOFF_MAX_DELAY_MS: u64 = 30_000;

/// Freedesktop icon name used for download alerts.
pub const ALERT_ICON: &str = "folder-download";
