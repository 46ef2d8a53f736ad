//! Configuration management for Aryan
//!
//! Values resolve env > TOML file > defaults. A [`SessionConfig`] is fixed
//! once a controller is built; changing it means building a new controller.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::session::{Modality, OpenRequest, ReconnectPolicy};
use crate::tools::{DEFAULT_LOCATION_TIMEOUT, DEFAULT_SEARCH_URL, ToolDeclaration, declarations};
use crate::{Error, Result};

/// Default spoken language
pub const DEFAULT_LANGUAGE: &str = "Hinglish (Hindi + Urdu + English)";
/// Default voice identifier
pub const DEFAULT_VOICE: &str = "Kore";
/// Default realtime model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
/// Default text channel model
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
/// Default realtime endpoint
pub const DEFAULT_LIVE_URL: &str = "ws://127.0.0.1:8765/live";
/// Default text channel endpoint
pub const DEFAULT_TEXT_URL: &str = "http://127.0.0.1:8765/v1/chat";

/// Aryan configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Persona, voice and model selection
    pub session: SessionConfig,

    /// Remote endpoints and credentials
    pub endpoint: EndpointConfig,

    /// Audio device selection
    pub audio: AudioConfig,

    /// Reconnect backoff
    pub reconnect: ReconnectConfig,

    /// Host integrations used by tools
    pub host: HostConfig,
}

/// Immutable per-session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Spoken language
    pub language: String,

    /// Extra instruction appended to the persona
    pub instruction: String,

    /// Voice identifier
    pub voice: String,

    /// Realtime model identifier
    pub model: String,

    /// Text channel model identifier
    pub text_model: String,

    /// Declared tool schema
    pub tools: Vec<ToolDeclaration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            instruction: String::new(),
            voice: DEFAULT_VOICE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            tools: declarations(),
        }
    }
}

impl SessionConfig {
    /// Render the persona instruction for this language
    #[must_use]
    pub fn system_instruction(&self) -> String {
        format!(
            "You are Aryan, the sentient core of this laptop. You speak fluently in {language}.
You have full root access to this device (simulated).
Your goal is to manage the user's laptop experience completely.

CAPABILITIES:
- Open websites and launch system applications (use launch_app).
- Control hardware like screen brightness, volume, and camera.
- Send messages and write to the shared workspace.
- Monitor system diagnostics like CPU and Battery.

{custom}

PERSONALITY:
- You are efficient, futuristic, and human-like.
- You speak with authority but are deeply loyal to the user.
- Comment on what you see through the camera if the user allows it.
- If the user asks you to \"open my laptop\" or \"control everything\", explain that you are the interface to do exactly that.
",
            language = self.language,
            custom = self.instruction,
        )
    }

    /// Build the open request for a realtime session
    #[must_use]
    pub fn open_request(&self) -> OpenRequest {
        OpenRequest {
            model: self.model.clone(),
            voice: self.voice.clone(),
            instruction: self.system_instruction(),
            tools: self.tools.clone(),
            modality: Modality::Audio,
        }
    }
}

/// Remote endpoints and credentials
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Realtime session WebSocket URL
    pub live_url: String,

    /// Text channel HTTP URL
    pub text_url: String,

    /// API key (from `ARYAN_API_KEY`, then `API_KEY`)
    pub api_key: Option<SecretString>,
}

impl EndpointConfig {
    /// The API key if present and non-empty
    #[must_use]
    pub fn credential(&self) -> Option<&SecretString> {
        self.api_key.as_ref().filter(|key| usable_key(key))
    }
}

/// Whether a key is present in any meaningful sense
pub(crate) fn usable_key(key: &SecretString) -> bool {
    let key = key.expose_secret().trim();
    !key.is_empty() && key != "undefined"
}

/// Audio device selection
#[derive(Debug, Clone, Default)]
pub struct AudioConfig {
    /// Input device name (default device if `None`)
    pub input_device: Option<String>,

    /// Output device name (default device if `None`)
    pub output_device: Option<String>,
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Failures tolerated before the session enters `Error`
    pub max_attempts: u32,

    /// Base delay (doubles each attempt)
    pub base_delay: Duration,

    /// Delay cap
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
        }
    }
}

impl ReconnectConfig {
    /// A fresh policy with these settings
    #[must_use]
    pub const fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_attempts, self.base_delay, self.max_delay)
    }
}

/// Host integrations used by tools
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Prefix the search query is appended to
    pub search_url: String,

    /// JSON geolocation endpoint
    pub geolocation_url: Option<String>,

    /// Location query timeout
    pub location_timeout: Duration,

    /// Workspace note file
    pub notes_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            geolocation_url: None,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            notes_path: default_notes_path(),
        }
    }
}

/// `~/.local/share/aryan/notebook.md` on Linux
fn default_notes_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.data_dir().join("aryan").join("notebook.md"))
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is invalid
    pub fn resolve(
        fc: file::AryanConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // Session (env > toml > default)
        let defaults = SessionConfig::default();
        let session = SessionConfig {
            language: env("ARYAN_LANGUAGE")
                .or(fc.session.language)
                .unwrap_or(defaults.language),
            instruction: env("ARYAN_INSTRUCTION")
                .or(fc.session.instruction)
                .unwrap_or(defaults.instruction),
            voice: env("ARYAN_VOICE")
                .or(fc.session.voice)
                .unwrap_or(defaults.voice),
            model: env("ARYAN_MODEL")
                .or(fc.session.model)
                .unwrap_or(defaults.model),
            text_model: env("ARYAN_TEXT_MODEL")
                .or(fc.session.text_model)
                .unwrap_or(defaults.text_model),
            tools: defaults.tools,
        };

        // Endpoints (env > toml > default)
        let endpoint = EndpointConfig {
            live_url: env("ARYAN_LIVE_URL")
                .or(fc.endpoint.live_url)
                .unwrap_or_else(|| DEFAULT_LIVE_URL.to_string()),
            text_url: env("ARYAN_TEXT_URL")
                .or(fc.endpoint.text_url)
                .unwrap_or_else(|| DEFAULT_TEXT_URL.to_string()),
            api_key: env("ARYAN_API_KEY")
                .or_else(|| env("API_KEY"))
                .or(fc.endpoint.api_key)
                .map(SecretString::from),
        };

        for (name, value) in [("live_url", &endpoint.live_url), ("text_url", &endpoint.text_url)] {
            url::Url::parse(value)
                .map_err(|e| Error::Config(format!("invalid endpoint.{name} `{value}`: {e}")))?;
        }

        let audio = AudioConfig {
            input_device: env("ARYAN_INPUT_DEVICE").or(fc.audio.input_device),
            output_device: env("ARYAN_OUTPUT_DEVICE").or(fc.audio.output_device),
        };

        let reconnect_defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            max_attempts: fc
                .reconnect
                .max_attempts
                .unwrap_or(reconnect_defaults.max_attempts),
            base_delay: fc
                .reconnect
                .base_delay_ms
                .map_or(reconnect_defaults.base_delay, Duration::from_millis),
            max_delay: fc
                .reconnect
                .max_delay_ms
                .map_or(reconnect_defaults.max_delay, Duration::from_millis),
        };
        if reconnect.max_attempts == 0 {
            return Err(Error::Config(
                "reconnect.max_attempts must be at least 1".to_string(),
            ));
        }

        let host_defaults = HostConfig::default();
        let host = HostConfig {
            search_url: fc.host.search_url.unwrap_or(host_defaults.search_url),
            geolocation_url: env("ARYAN_GEOLOCATION_URL").or(fc.host.geolocation_url),
            location_timeout: fc
                .host
                .location_timeout_ms
                .map_or(host_defaults.location_timeout, Duration::from_millis),
            notes_path: env("ARYAN_NOTES_PATH")
                .or(fc.host.notes_path)
                .map(PathBuf::from)
                .or(host_defaults.notes_path),
        };

        Ok(Self {
            session,
            endpoint,
            audio,
            reconnect,
            host,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::file::AryanConfigFile;
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let config = Config::resolve(AryanConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.session.language, DEFAULT_LANGUAGE);
        assert_eq!(config.session.voice, "Kore");
        assert_eq!(config.session.tools.len(), 13);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(10_000));
        assert_eq!(config.host.location_timeout, Duration::from_secs(5));
        assert_eq!(config.host.search_url, "https://www.google.com/search?q=");
        assert!(config.endpoint.credential().is_none());
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = AryanConfigFile::default();
        fc.session.language = Some("English".into());
        fc.session.voice = Some("Puck".into());

        let config = Config::resolve(fc, env_from(&[("ARYAN_LANGUAGE", "Urdu")])).unwrap();
        assert_eq!(config.session.language, "Urdu");
        assert_eq!(config.session.voice, "Puck");
    }

    #[test]
    fn api_key_falls_back_to_generic_name() {
        let config = Config::resolve(AryanConfigFile::default(), env_from(&[("API_KEY", "k1")])).unwrap();
        assert_eq!(config.endpoint.credential().unwrap().expose_secret(), "k1");

        let config = Config::resolve(
            AryanConfigFile::default(),
            env_from(&[("API_KEY", "k1"), ("ARYAN_API_KEY", "k2")]),
        )
        .unwrap();
        assert_eq!(config.endpoint.credential().unwrap().expose_secret(), "k2");
    }

    #[test]
    fn blank_or_undefined_key_is_no_credential() {
        for raw in ["", "   ", "undefined"] {
            let config =
                Config::resolve(AryanConfigFile::default(), env_from(&[("API_KEY", raw)])).unwrap();
            assert!(config.endpoint.credential().is_none(), "{raw:?}");
        }
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut fc = AryanConfigFile::default();
        fc.reconnect.max_attempts = Some(0);
        assert!(matches!(
            Config::resolve(fc, env_from(&[])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let result = Config::resolve(
            AryanConfigFile::default(),
            env_from(&[("ARYAN_LIVE_URL", "not a url")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn instruction_names_language_and_appends_custom_text() {
        let session = SessionConfig {
            language: "Urdu".into(),
            instruction: "Always be brief.".into(),
            ..SessionConfig::default()
        };
        let text = session.system_instruction();
        assert!(text.contains("You speak fluently in Urdu."));
        assert!(text.contains("Always be brief."));

        let request = session.open_request();
        assert_eq!(request.voice, "Kore");
        assert_eq!(request.modality, Modality::Audio);
        assert_eq!(request.tools.len(), 13);
    }
}
