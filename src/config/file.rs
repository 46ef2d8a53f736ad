//! TOML configuration file loading
//!
//! Supports `~/.config/aryan/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AryanConfigFile {
    /// Session persona and model selection
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Remote endpoints and credentials
    #[serde(default)]
    pub endpoint: EndpointFileConfig,

    /// Audio device selection
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Reconnect backoff
    #[serde(default)]
    pub reconnect: ReconnectFileConfig,

    /// Host integrations used by tools
    #[serde(default)]
    pub host: HostFileConfig,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Spoken language (e.g. "Hinglish (Hindi + Urdu + English)")
    pub language: Option<String>,

    /// Extra instruction appended to the persona
    pub instruction: Option<String>,

    /// Voice identifier (e.g. "Kore")
    pub voice: Option<String>,

    /// Realtime model identifier
    pub model: Option<String>,

    /// Text channel model identifier
    pub text_model: Option<String>,
}

/// Endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct EndpointFileConfig {
    pub live_url: Option<String>,
    pub text_url: Option<String>,
    pub api_key: Option<String>,
}

/// Audio device configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Input device name (default device if unset)
    pub input_device: Option<String>,

    /// Output device name (default device if unset)
    pub output_device: Option<String>,
}

/// Reconnect configuration
#[derive(Debug, Default, Deserialize)]
pub struct ReconnectFileConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Host integration configuration
#[derive(Debug, Default, Deserialize)]
pub struct HostFileConfig {
    /// Prefix the search query is appended to
    pub search_url: Option<String>,

    /// JSON endpoint answering `{"lat": .., "lon": ..}`
    pub geolocation_url: Option<String>,

    /// Location query timeout
    pub location_timeout_ms: Option<u64>,

    /// Workspace note file
    pub notes_path: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AryanConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> AryanConfigFile {
    config_file_path().map_or_else(AryanConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`
///
/// Returns `AryanConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_from(path: &Path) -> AryanConfigFile {
    if !path.exists() {
        return AryanConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AryanConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AryanConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/aryan/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aryan").join("config.toml"))
}
