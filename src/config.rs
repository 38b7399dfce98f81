//! Deployment settings, read from a [ron] file and overridden from the
//! command line. A complete file looks like this, and every field may be
//! left out:
//!
//! ```text
//! (
//!     port: (
//!         endpoint: Some("/dev/ttyACM0"),
//!         baud_rate: 115200,
//!         read_timeout_ms: 1000,
//!         poll_interval_ms: 10,
//!     ),
//!     geometry: (
//!         mic_distance: 0.5,
//!         speed_of_sound: 1500.0,
//!     ),
//! )
//! ```

use crate::args::BearingArgs;
use crate::bearing_estimator::Geometry;
use crate::ingestion_channel::{
    ChannelSettings, DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL, DEFAULT_READ_TIMEOUT,
};
use crate::line_assembler::MAX_LINE_LEN;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, path::Path, time::Duration};

/// Everything that can be configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How to reach the microcontroller.
    pub port: PortConfig,
    /// The hydrophone array.
    pub geometry: Geometry,
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Device path or port name. Asked for interactively when missing.
    pub endpoint: Option<String>,
    /// Line speed.
    pub baud_rate: u32,
    /// How long a started line may take to finish, in milliseconds.
    pub read_timeout_ms: u64,
    /// How often the reader looks for a stop request, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl PortConfig {
    /// The reader timing these settings describe.
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_line_len: MAX_LINE_LEN,
        }
    }
}

/// What can go wrong loading a [`Config`].
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    IoError(std::io::Error),

    /// The file is not valid RON, or does not match [`Config`].
    RonSpannedError(ron::de::SpannedError),

    /// The config could not be written out as RON.
    RonError(ron::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ConfigError::IoError(error) => Cow::from(format!("io error: {}", error)),
            ConfigError::RonSpannedError(error) => {
                Cow::from(format!("bad config file: {}", error))
            }
            ConfigError::RonError(error) => Cow::from(format!("ron error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Read a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_ron_str(&text)
    }

    /// Parse a config from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::de::from_str(text).map_err(ConfigError::RonSpannedError)
    }

    /// The config as pretty-printed RON, suitable for saving as a file.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, PrettyConfig::default()).map_err(ConfigError::RonError)
    }

    /// The file named on the command line (or the defaults), with the
    /// command line flags laid on top.
    pub fn resolve(args: &BearingArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply(args);
        Ok(config)
    }

    /// Lay the command line flags over this config.
    pub fn apply(&mut self, args: &BearingArgs) {
        if let Some(baud_rate) = args.baud_rate {
            self.port.baud_rate = baud_rate;
        }
        if let Some(mic_distance) = args.mic_distance {
            self.geometry.mic_distance = mic_distance;
        }
        if let Some(speed_of_sound) = args.speed_of_sound {
            self.geometry.speed_of_sound = speed_of_sound;
        }
        if let Some(endpoint) = args.command.endpoint() {
            self.port.endpoint = Some(endpoint.to_owned());
        }
    }
}
