//! Platform detection and OS-specific utilities.

use std::path::PathBuf;
use crate::error::{VdError, VdResult};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Get the platform-specific application data directory.
    ///
    /// - Windows: `%APPDATA%/Vidarr`
    /// - macOS: `~/Library/Application Support/Vidarr`
    /// - Linux: `~/.local/share/Vidarr`
    pub fn data_dir() -> VdResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| VdError::Config("could not determine data directory".into()))?;
        Ok(base.join("Vidarr"))
    }

    /// Get the platform-specific configuration directory.
    ///
    /// - Windows: `%APPDATA%/Vidarr`
    /// - macOS: `~/Library/Application Support/Vidarr`
    /// - Linux: `~/.config/Vidarr`
    pub fn config_dir() -> VdResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| VdError::Config("could not determine config directory".into()))?;
        Ok(base.join("Vidarr"))
    }

    /// Get the platform-specific cache directory.
    pub fn cache_dir() -> VdResult<PathBuf> {
        let base = dirs::cache_dir()
            .ok_or_else(|| VdError::Config("could not determine cache directory".into()))?;
        Ok(base.join("Vidarr"))
    }

    /// Get a human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
