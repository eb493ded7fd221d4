//! Application configuration
//!
//! Loaded from TOML; every section falls back to its defaults so an empty
//! or partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, StreamError};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: HostConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

/// Render host settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub sample_rate: u32,
    /// Render quantum in frames
    pub block_size: usize,
    pub channels: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: RENDER_BLOCK_SIZE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

/// Stream node and strategy defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Refill period for timed and worker strategies
    pub fill_interval_ms: u32,
    /// Fill intervals of audio the buffer holds
    pub frame_buffer_chunks: u32,
    /// Period of the control-side message pump
    pub message_poll_interval_ms: u32,
    pub control_channel_capacity: usize,
    pub event_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fill_interval_ms: DEFAULT_FILL_INTERVAL_MS,
            frame_buffer_chunks: DEFAULT_FRAME_BUFFER_CHUNKS,
            message_poll_interval_ms: DEFAULT_MESSAGE_POLL_INTERVAL_MS,
            control_channel_capacity: CONTROL_CHANNEL_CAPACITY,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl StreamConfig {
    /// Reject values a stream node cannot run with
    pub fn validate(&self) -> Result<(), StreamError> {
        let checks = [
            (self.fill_interval_ms as usize, "stream.fill_interval_ms"),
            (self.frame_buffer_chunks as usize, "stream.frame_buffer_chunks"),
            (self.message_poll_interval_ms as usize, "stream.message_poll_interval_ms"),
            (self.control_channel_capacity, "stream.control_channel_capacity"),
            (self.event_channel_capacity, "stream.event_channel_capacity"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(StreamError::Validation(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load from the platform config directory, or defaults if there is no file there
    pub fn load_or_default() -> Result<Self, Error> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/config.toml` for this application
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "audio-output-stream")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values no stream could be built with
    pub fn validate(&self) -> Result<(), Error> {
        let checks = [
            (self.host.sample_rate as usize, "host.sample_rate"),
            (self.host.block_size, "host.block_size"),
            (self.host.channels, "host.channels"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }
        self.stream
            .validate()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.stream.fill_interval_ms, 20);
        assert_eq!(config.stream.frame_buffer_chunks, 5);
        assert_eq!(config.host.block_size, 128);
    }

    #[test]
    fn test_partial_document() {
        let config = AppConfig::from_toml_str(
            r#"
            [host]
            sample_rate = 44100

            [stream]
            fill_interval_ms = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.host.sample_rate, 44100);
        assert_eq!(config.host.channels, 2);
        assert_eq!(config.stream.fill_interval_ms, 10);
        assert_eq!(config.stream.frame_buffer_chunks, 5);
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = AppConfig::from_toml_str("[stream]\nframe_buffer_chunks = 0\n").unwrap_err();
        assert!(err.to_string().contains("frame_buffer_chunks"));
    }

    #[test]
    fn test_stream_config_rejects_each_zero() {
        let zeroed = [
            StreamConfig {
                fill_interval_ms: 0,
                ..Default::default()
            },
            StreamConfig {
                frame_buffer_chunks: 0,
                ..Default::default()
            },
            StreamConfig {
                message_poll_interval_ms: 0,
                ..Default::default()
            },
            StreamConfig {
                control_channel_capacity: 0,
                ..Default::default()
            },
            StreamConfig {
                event_channel_capacity: 0,
                ..Default::default()
            },
        ];
        for config in zeroed {
            assert!(matches!(config.validate(), Err(StreamError::Validation(_))), "{:?}", config);
        }
        assert_eq!(StreamConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = AppConfig::default();
        config.logging.filter = "debug".to_string();
        let text = config.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }
}
