//! Process-wide configuration for the call bridge.
//!
//! Configuration is loaded from environment variables (with `.env` support
//! via dotenvy) or constructed programmatically by the host. Priority:
//! explicit builder calls > ENV vars > `.env` values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use callbridge::config::BridgeConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables (HUME_API_KEY, HUME_CONFIG_ID, ...)
//! let config = BridgeConfig::from_env()?;
//! # Ok(())
//! # }
//! ```

use std::env;

use crate::core::evi::{AudioEncoding, EVI_WEBSOCKET_URL, EviConfig};
use crate::errors::bridge_error::{BridgeError, BridgeResult};

/// Default bound on the connect/probe deadline, in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Telephony audio arrives at 8 kHz mono.
const DEFAULT_SAMPLE_RATE: u32 = 8000;

const DEFAULT_CHANNELS: u8 = 1;

/// Bridge configuration.
///
/// Carries the engine credentials and per-connection audio settings used to
/// open every session. Credentials are resolved once per operation from this
/// struct; they are never stored on a session.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Hume AI API key for EVI (Empathic Voice Interface)
    pub hume_api_key: Option<String>,
    /// EVI configuration ID (created in the Hume dashboard); echoed in
    /// session diagnostics
    pub hume_config_id: Option<String>,
    /// Streaming endpoint URL (defaults to Hume's production endpoint)
    pub websocket_url: String,
    /// Deadline for connection attempts and the startup connectivity probe
    pub connect_timeout_secs: u64,
    /// Request interim user transcripts from the engine
    pub verbose_transcription: bool,
    /// System prompt override sent with session settings
    pub system_prompt: Option<String>,
    /// Input audio encoding declared to the engine
    pub input_encoding: AudioEncoding,
    /// Input audio sample rate in Hz
    pub sample_rate: u32,
    /// Number of input audio channels
    pub channels: u8,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            hume_api_key: None,
            hume_config_id: None,
            websocket_url: EVI_WEBSOCKET_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            verbose_transcription: true,
            system_prompt: None,
            input_encoding: AudioEncoding::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads a `.env` file first when one is present. Recognized variables:
    ///
    /// - `HUME_API_KEY`
    /// - `HUME_CONFIG_ID`
    /// - `EVI_WEBSOCKET_URL`
    /// - `EVI_CONNECT_TIMEOUT_SECS`
    /// - `EVI_VERBOSE_TRANSCRIPTION` (`true`/`false`)
    /// - `EVI_SYSTEM_PROMPT`
    /// - `EVI_SAMPLE_RATE`
    pub fn from_env() -> BridgeResult<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self {
            hume_api_key: read_var("HUME_API_KEY"),
            hume_config_id: read_var("HUME_CONFIG_ID"),
            ..Default::default()
        };

        if let Some(url) = read_var("EVI_WEBSOCKET_URL") {
            config.websocket_url = url;
        }
        if let Some(timeout) = read_var("EVI_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout_secs = timeout.parse().map_err(|_| {
                BridgeError::InvalidConfiguration(format!(
                    "EVI_CONNECT_TIMEOUT_SECS must be a positive integer, got '{timeout}'"
                ))
            })?;
        }
        if let Some(flag) = read_var("EVI_VERBOSE_TRANSCRIPTION") {
            config.verbose_transcription = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
        if let Some(prompt) = read_var("EVI_SYSTEM_PROMPT") {
            config.system_prompt = Some(prompt);
        }
        if let Some(rate) = read_var("EVI_SAMPLE_RATE") {
            config.sample_rate = rate.parse().map_err(|_| {
                BridgeError::InvalidConfiguration(format!(
                    "EVI_SAMPLE_RATE must be a positive integer, got '{rate}'"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with an API key and defaults for the rest.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            hume_api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Set the EVI configuration ID.
    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.hume_config_id = Some(config_id.into());
        self
    }

    /// Override the streaming endpoint URL.
    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = url.into();
        self
    }

    /// Set the connect/probe deadline in seconds.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set the system prompt override.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the input audio sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.websocket_url.is_empty() {
            return Err(BridgeError::InvalidConfiguration(
                "websocket_url must not be empty".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "sample_rate must be greater than 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "channels must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve credentials into a per-connection [`EviConfig`].
    ///
    /// Fails when no API key is configured.
    pub fn evi_config(&self) -> BridgeResult<EviConfig> {
        let api_key = self
            .hume_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                BridgeError::InvalidConfiguration(
                    "HUME_API_KEY is not configured".to_string(),
                )
            })?;

        Ok(EviConfig {
            api_key: api_key.to_string(),
            config_id: self.hume_config_id.clone(),
            verbose_transcription: self.verbose_transcription,
            input_encoding: self.input_encoding,
            sample_rate: self.sample_rate,
            channels: self.channels,
            system_prompt: self.system_prompt.clone(),
            websocket_url: self.websocket_url.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
        })
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
