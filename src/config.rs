//! Application configuration.
//!
//! Settings are loaded from environment variables (with a `.env` file for
//! local development) and collected into a single struct passed through the
//! application.

use sndctl_voice_types::audio::Voice;
use std::env;
use std::str::FromStr;
use tracing::Level;

// --- Application Constants ---

/// Samples per capture callback block.
pub const CAPTURE_CHUNK_SIZE: usize = 4096;
/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// The latency budget for the output audio buffer, in milliseconds.
pub const OUTPUT_LATENCY_MS: usize = 1000;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint that mints short-lived connection credentials.
    pub token_endpoint: String,
    /// Websocket URL of the realtime assistant service.
    pub realtime_url: String,
    /// Base URL of the device-control API.
    pub device_api_url: String,
    pub voice: Voice,
    pub turn_detection_threshold: f32,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Turn-detection threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// * `SNDCTL_VOICE_TOKEN_ENDPOINT`: URL of the session-token endpoint. Required.
    /// * `SNDCTL_VOICE_REALTIME_URL`: Websocket URL of the assistant service.
    ///   Defaults to the OpenAI realtime endpoint.
    /// * `SNDCTL_VOICE_DEVICE_API`: Base URL of the device-control API.
    ///   Defaults to "http://localhost:8000".
    /// * `SNDCTL_VOICE_VOICE`: (Optional) Assistant voice name. Defaults to "coral".
    /// * `SNDCTL_VOICE_THRESHOLD`: (Optional) Turn-detection sensitivity, 0.0..=1.0.
    ///   Defaults to 0.5.
    /// * `RUST_LOG`: (Optional) Logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let token_endpoint = env::var("SNDCTL_VOICE_TOKEN_ENDPOINT")
            .map_err(|_| ConfigError::MissingVar("SNDCTL_VOICE_TOKEN_ENDPOINT".to_string()))?;

        let realtime_url = env::var("SNDCTL_VOICE_REALTIME_URL")
            .unwrap_or_else(|_| "wss://api.openai.com/v1/realtime".to_string());

        let device_api_url = env::var("SNDCTL_VOICE_DEVICE_API")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        let voice = env::var("SNDCTL_VOICE_VOICE")
            .map(|s| Voice::from_str(&s).unwrap_or(Voice::Coral))
            .unwrap_or(Voice::Coral);

        let threshold_str = env::var("SNDCTL_VOICE_THRESHOLD").unwrap_or_else(|_| "0.5".to_string());
        let turn_detection_threshold = parse_threshold(&threshold_str)?;

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            token_endpoint,
            realtime_url,
            device_api_url,
            voice,
            turn_detection_threshold,
            log_level,
        })
    }
}

fn parse_threshold(s: &str) -> Result<f32, ConfigError> {
    let value = s
        .parse::<f32>()
        .map_err(|_| ConfigError::InvalidThreshold(s.to_string()))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidThreshold(s.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_parses_within_unit_range() {
        assert_eq!(parse_threshold("0.5").unwrap(), 0.5);
        assert_eq!(parse_threshold("0").unwrap(), 0.0);
        assert_eq!(parse_threshold("1").unwrap(), 1.0);
    }

    #[test]
    fn threshold_rejects_out_of_range_and_garbage() {
        assert!(parse_threshold("1.5").is_err());
        assert!(parse_threshold("-0.1").is_err());
        assert!(parse_threshold("loud").is_err());
    }
}
