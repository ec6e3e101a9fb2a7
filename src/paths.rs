//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | Linux | macOS |
//! |---------|-------|-------|
//! | Data (state, media, logs) | `~/.local/share/profilewatch/` | `~/Library/Application Support/profilewatch/` |
//! | Config | `~/.config/profilewatch/` | `~/Library/Application Support/profilewatch/` |
//!
//! # Environment Overrides
//!
//! - `PROFILEWATCH_DATA_DIR` overrides [`data_dir`]
//! - `PROFILEWATCH_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PROFILEWATCH_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("profilewatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/profilewatch-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PROFILEWATCH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("profilewatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/profilewatch-config"))
}

/// Per-entity state and media root (`data_dir()/output/`).
#[must_use]
pub fn output_dir() -> PathBuf {
    data_dir().join("output")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
