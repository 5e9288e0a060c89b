//! Configuration management for callprobe
//!
//! Settings are loaded from an optional `callprobe.toml` next to the
//! binary, overridden by `CALLPROBE_`-prefixed environment variables
//! (`CALLPROBE_TWILIO__ACCOUNT_SID`, `CALLPROBE_OPENAI__MODEL`, ...).
//! The built-in patient scenario catalog lives here too.

pub mod scenarios;
pub mod settings;

pub use scenarios::{all_scenarios, get_scenario, scenario_ids};
pub use settings::{
    load_settings, CallSettings, DeepgramSettings, OpenAiSettings, ServerSettings, Settings,
    TwilioSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Missing required settings: {}", .0.join(", "))]
    Missing(Vec<String>),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
