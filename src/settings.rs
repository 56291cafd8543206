//! Crate configuration bootstrap.
//!
//! Engine construction details that vary per deployment (where default
//! files live, command framing, the bulk query word, channel banking)
//! load from an optional TOML file through the `config` crate. Every field
//! has a serde default, so a missing file yields a usable configuration.
//!
//! ```toml
//! # config/default.toml
//! defaults_dir = "/var/lib/lab/defaults"
//! bulk_query = "SET?"
//!
//! [format]
//! header_echo = false
//! leading_separator = true
//!
//! [channel]
//! select_template = "CH {channel}"
//! capacity = 8
//!
//! [timeouts]
//! query_timeout_ms = 2000
//! ```

use crate::cache::CommandFormat;
use crate::error::Result;
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;

/// Deployment-level settings for cache engines and channel banks.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory holding per-instrument default files. Falls back to the
    /// platform data directory when absent.
    #[serde(default)]
    pub defaults_dir: Option<PathBuf>,
    /// The "report all settings" query word.
    #[serde(default = "default_bulk_query")]
    pub bulk_query: String,
    /// Command framing flags.
    #[serde(default)]
    pub format: CommandFormat,
    /// Channel banking parameters.
    #[serde(default)]
    pub channel: ChannelSettings,
    /// Transport timing.
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

/// Channel banking parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    /// Channel-select command template with a `{channel}` slot.
    #[serde(default = "default_select_template")]
    pub select_template: String,
    /// Declared channel capacity of the bank.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

/// Transport timing parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSettings {
    /// Round-trip timeout applied to engine transports, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_bulk_query() -> String {
    "SET?".to_string()
}

fn default_select_template() -> String {
    "CH {channel}".to_string()
}

fn default_capacity() -> u32 {
    1
}

fn default_query_timeout_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            defaults_dir: None,
            bulk_query: default_bulk_query(),
            format: CommandFormat::default(),
            channel: ChannelSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            select_template: default_select_template(),
            capacity: default_capacity(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl Settings {
    /// Load `config/<name>.toml` (default `config/default.toml`); a missing
    /// file yields the serde defaults.
    pub fn new(config_name: Option<&str>) -> Result<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let loaded = Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .build()?;
        Ok(loaded.try_deserialize()?)
    }
}
