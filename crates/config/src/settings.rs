//! Typed settings with environment overrides and startup validation

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::ConfigError;

/// Top-level settings for the callprobe process
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub twilio: TwilioSettings,
    pub deepgram: DeepgramSettings,
    pub openai: OpenAiSettings,
    pub call: CallSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Public HTTPS URL Twilio can reach; auto-detected from ngrok if unset
    pub public_url: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    /// The number calls are placed from
    pub from_number: String,
    /// The AI agent's number under test
    pub target_number: String,
    /// Hard ceiling on call length, seconds
    pub max_call_duration_secs: u32,
}

impl Default for TwilioSettings {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            target_number: String::new(),
            max_call_duration_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeepgramSettings {
    pub api_key: String,
    pub stt_model: String,
    /// Silence (ms) after which Deepgram marks speech final
    pub endpointing_ms: u32,
    /// Longer silence (ms) after which Deepgram emits UtteranceEnd
    pub utterance_end_ms: u32,
}

impl Default for DeepgramSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            stt_model: "nova-2".to_string(),
            endpointing_ms: 300,
            utterance_end_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 200,
            temperature: 0.8,
        }
    }
}

/// Real-time knobs for the per-call engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallSettings {
    /// Nominal duration of one outbound audio frame
    pub frame_duration_ms: u64,
    /// Wait after a turn boundary before committing to a reply
    pub settle_delay_ms: u64,
    /// Let the farewell finish audibly before hanging up
    pub hangup_grace_ms: u64,
    /// Silence before the keepalive filler fires
    pub silence_threshold_ms: u64,
    /// Keepalive poll cadence
    pub keepalive_poll_ms: u64,
    /// Spacing of silence frames while nobody is speaking
    pub idle_frame_interval_ms: u64,
    /// Directory transcripts are written under
    pub transcripts_dir: String,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            frame_duration_ms: 20,
            settle_delay_ms: 200,
            hangup_grace_ms: 2000,
            silence_threshold_ms: 10_000,
            keepalive_poll_ms: 1000,
            idle_frame_interval_ms: 200,
            transcripts_dir: "transcripts".to_string(),
        }
    }
}

/// Load settings from `callprobe.toml` (optional) and the environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let cfg = Config::builder()
        .add_source(File::with_name("callprobe").required(false))
        .add_source(Environment::with_prefix("CALLPROBE").separator("__"))
        .build()?;

    Ok(cfg.try_deserialize()?)
}

impl Settings {
    /// Names of required settings that are still empty.
    ///
    /// Startup refuses to proceed while any are missing; everything else
    /// has a usable default.
    pub fn missing(&self) -> Vec<String> {
        let required = [
            ("twilio.account_sid", &self.twilio.account_sid),
            ("twilio.auth_token", &self.twilio.auth_token),
            ("twilio.from_number", &self.twilio.from_number),
            ("twilio.target_number", &self.twilio.target_number),
            ("deepgram.api_key", &self.deepgram.api_key),
            ("openai.api_key", &self.openai.api_key),
        ];
        required
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}
