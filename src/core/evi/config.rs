//! EVI connection configuration.
//!
//! One [`EviConfig`] describes everything needed to open a stream: the
//! credentials that go into the handshake URL and the audio settings
//! declared to the engine after connect.

use serde::{Deserialize, Serialize};

use super::messages::{
    AudioEncoding, EVI_DEFAULT_CHANNELS, EVI_DEFAULT_SAMPLE_RATE, EVI_WEBSOCKET_URL,
};
use crate::errors::bridge_error::{BridgeError, BridgeResult};

/// Configuration for one EVI streaming connection.
///
/// Credentials ride on the connection handshake as query parameters: the
/// access key, the optional configuration ID, and the verbose-transcription
/// flag that requests interim user transcripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EviConfig {
    /// API key for Hume AI.
    pub api_key: String,

    /// EVI configuration ID (prompt, language model, voice) created in the
    /// Hume dashboard. Default engine settings apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,

    /// Request interim user transcripts.
    #[serde(default)]
    pub verbose_transcription: bool,

    /// Input audio encoding format.
    #[serde(default)]
    pub input_encoding: AudioEncoding,

    /// Input audio sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Number of input audio channels.
    #[serde(default = "default_channels")]
    pub channels: u8,

    /// System prompt override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// WebSocket URL (defaults to Hume's production endpoint).
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_sample_rate() -> u32 {
    EVI_DEFAULT_SAMPLE_RATE
}

fn default_channels() -> u8 {
    EVI_DEFAULT_CHANNELS
}

fn default_websocket_url() -> String {
    EVI_WEBSOCKET_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for EviConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            config_id: None,
            verbose_transcription: false,
            input_encoding: AudioEncoding::default(),
            sample_rate: EVI_DEFAULT_SAMPLE_RATE,
            channels: EVI_DEFAULT_CHANNELS,
            system_prompt: None,
            websocket_url: EVI_WEBSOCKET_URL.to_string(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl EviConfig {
    /// Create a configuration with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Set the EVI configuration ID.
    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    /// Request interim user transcripts.
    pub fn with_verbose_transcription(mut self) -> Self {
        self.verbose_transcription = true;
        self
    }

    /// Set the audio encoding.
    pub fn with_encoding(mut self, encoding: AudioEncoding) -> Self {
        self.input_encoding = encoding;
        self
    }

    /// Set the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Override the WebSocket endpoint.
    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = url.into();
        self
    }

    /// Build the WebSocket URL with handshake query parameters.
    pub fn build_websocket_url(&self) -> String {
        fn encode(s: &str) -> String {
            url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
        }

        let mut url = self.websocket_url.clone();
        let mut params = vec![format!("api_key={}", encode(&self.api_key))];

        if let Some(ref config_id) = self.config_id {
            params.push(format!("config_id={}", encode(config_id)));
        }

        if self.verbose_transcription {
            params.push("verbose_transcription=true".to_string());
        }

        url.push('?');
        url.push_str(&params.join("&"));
        url
    }

    /// Whether the configuration deviates from engine defaults and needs a
    /// `session_settings` frame after connect.
    pub fn needs_session_settings(&self) -> bool {
        self.input_encoding != AudioEncoding::default()
            || self.sample_rate != EVI_DEFAULT_SAMPLE_RATE
            || self.channels != EVI_DEFAULT_CHANNELS
            || self.system_prompt.is_some()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.api_key.is_empty() {
            return Err(BridgeError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "Channels must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
