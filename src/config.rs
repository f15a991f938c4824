//! Configuration management for voxd.
//!
//! This module provides functionality for loading and managing application
//! configuration: audio capture settings, the remote transcription service,
//! transcript and daemon paths, the web server bind address, and the
//! keystroke-injection tools.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct AudioConfig {
    /// Number of audio channels (1 for mono)
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Audio input device name (e.g., "sysdefault:CARD=C920")
    /// If not specified, the default device will be used
    pub device: Option<String>,
    /// Seconds of ambient audio sampled at startup to derive the speech
    /// energy threshold
    pub calibration_secs: f32,
    /// Seconds of continuous silence that end a phrase
    pub silence_duration: f32,
    /// Hard cap on phrase length in seconds
    pub phrase_time_limit: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 16000,
            device: None,
            calibration_secs: 1.0,
            silence_duration: 0.8,
            phrase_time_limit: 30.0,
        }
    }
}

/// Remote transcription service configuration.
///
/// Any OpenAI-compatible `audio/transcriptions` endpoint works here,
/// including a locally running whisper server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct RecognizerConfig {
    /// Endpoint URL for multipart transcription requests
    pub url: String,
    /// Bearer token. Falls back to the `VOXD_API_KEY` environment variable
    /// when unset; some local servers need no key at all.
    pub api_key: Option<String>,
    /// Model name sent in the request form
    pub model: String,
    /// Optional language hint (e.g., "en")
    pub language: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            language: None,
            timeout_secs: 30,
        }
    }
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct PathConfig {
    /// File that recognized text is appended to, one `[HH:MM:SS] text`
    /// line per transcription
    pub transcript: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .context("Cannot find data directory")
            .unwrap_or_else(|_| PathBuf::from("~/.local/share"));
        let mut transcript = data_dir;
        transcript.push("voxd");
        transcript.push("transcriptions.txt");
        Self { transcript }
    }
}

/// Daemon lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct DaemonConfig {
    /// PID file recording the detached process id
    pub pid_file: PathBuf,
    /// Log file the daemon's stdout/stderr are redirected to
    pub log_file: PathBuf,
    /// Seconds to wait before resuming the loop after a service error
    pub retry_backoff_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: PathBuf::from("/tmp/voxd.pid"),
            log_file: PathBuf::from("/tmp/voxd.log"),
            retry_backoff_secs: 5,
        }
    }
}

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,
    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Keystroke injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct InjectionConfig {
    /// Primary typing tool (X11)
    pub tool: String,
    /// Fallback typing tool (Wayland)
    pub fallback_tool: String,
    /// Append a trailing space after each phrase for natural dictation
    pub append_space: bool,
    /// Milliseconds before a hung tool is killed
    pub timeout_ms: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            tool: "xdotool".to_string(),
            fallback_tool: "ydotool".to_string(),
            append_space: true,
            timeout_ms: 5000,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct Config {
    /// Audio capture settings
    pub audio: AudioConfig,
    /// Remote transcription service settings
    pub recognizer: RecognizerConfig,
    /// Path configuration
    pub paths: PathConfig,
    /// Daemon lifecycle settings
    pub daemon: DaemonConfig,
    /// Web server settings
    pub server: ServerConfig,
    /// Keystroke injection settings
    pub injection: InjectionConfig,
}

impl Config {
    /// Gets the default configuration file path.
    fn default_config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .context("Cannot find config directory")
            .unwrap_or_else(|_| PathBuf::from("~/.config"));
        let mut path = config_dir;
        path.push("voxd");
        path.push("config.toml");
        path
    }

    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Loads configuration from the default location, creating it if it doesn't exist.
    pub fn load_or_write_default(path: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_config_path();
        let path = path.unwrap_or(&default_path);
        // If config exists, use it
        if path.exists() {
            return Self::from_file(path)
                .context(format!("Reading config from {}", path.display()));
        }

        // If no config exists, create default config
        let config = Self::default();
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save_to_file(path)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.recognizer.model, "whisper-1");
        assert!(config.recognizer.api_key.is_none());
        assert_eq!(config.daemon.pid_file, PathBuf::from("/tmp/voxd.pid"));
        assert_eq!(config.daemon.log_file, PathBuf::from("/tmp/voxd.log"));
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.injection.tool, "xdotool");
        assert_eq!(config.injection.fallback_tool, "ydotool");
        assert!(config.injection.append_space);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("channels = 1"));
        assert!(toml.contains("sample_rate = 16000"));
        assert!(toml.contains("model = \"whisper-1\""));
        assert!(toml.contains("pid_file = \"/tmp/voxd.pid\""));
        assert!(toml.contains("port = 5000"));
        assert!(toml.contains("tool = \"xdotool\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [audio]
            channels = 1
            sample_rate = 16000
            calibration_secs = 0.5
            silence_duration = 1.2
            phrase_time_limit = 10.0
            device = "sysdefault:CARD=C920"

            [recognizer]
            url = "http://localhost:8080/inference"
            api_key = "secret"
            model = "base.en"
            language = "en"
            timeout_secs = 10

            [paths]
            transcript = "/tmp/test/transcriptions.txt"

            [daemon]
            pid_file = "/run/user/1000/voxd.pid"
            log_file = "/tmp/voxd-test.log"
            retry_backoff_secs = 2

            [server]
            bind = "127.0.0.1"
            port = 8088

            [injection]
            tool = "xdotool"
            fallback_tool = "ydotool"
            append_space = false
            timeout_ms = 1000
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.audio.device.as_deref(), Some("sysdefault:CARD=C920"));
        assert_eq!(config.audio.silence_duration, 1.2);
        assert_eq!(config.recognizer.url, "http://localhost:8080/inference");
        assert_eq!(config.recognizer.api_key.as_deref(), Some("secret"));
        assert_eq!(config.recognizer.language.as_deref(), Some("en"));
        assert_eq!(
            config.paths.transcript,
            PathBuf::from("/tmp/test/transcriptions.txt")
        );
        assert_eq!(config.daemon.retry_backoff_secs, 2);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 8088);
        assert!(!config.injection.append_space);
        assert_eq!(config.injection.timeout_ms, 1000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Sections omitted from the file fall back to their defaults.
        let toml = r#"
            [server]
            bind = "127.0.0.1"
            port = 9000
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.injection.tool, "xdotool");
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.recognizer.url = "http://localhost:9999/v1/audio/transcriptions".to_string();
        config.recognizer.model = "tiny.en".to_string();
        config.server.port = 8123;
        config.injection.append_space = false;

        config.save_to_file(&config_path).unwrap();
        let loaded_config = Config::from_file(&config_path).unwrap();

        assert_eq!(loaded_config, config);
    }

    #[test]
    fn test_config_creation() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("voxd").join("config.toml");

        // Load config (should create default config)
        let config = Config::load_or_write_default(Some(&config_path)).unwrap();

        // Verify config was created
        assert!(config_path.exists());

        // Verify default values
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.recognizer.model, "whisper-1");
    }

    #[test]
    fn test_default_config_round_trip() {
        let default = Config::default();
        let serialized = toml::to_string(&default).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(default, deserialized);
    }

    #[test]
    fn test_invalid_config() {
        let toml = r#"
            [audio]
            channels = "invalid"  # Should be a number
            sample_rate = 16000
        "#;

        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
