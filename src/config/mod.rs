//! Channel configuration model
//!
//! Each modem link is described by a [`ChannelConfig`]. Values coming from
//! the settings file or the operator pass through [`validate`], which repairs
//! anything out of range to the channel's defaults instead of failing.

pub mod manager;
pub mod store;

pub use manager::{ConfigManager, LoadReport, ModemSettings};
pub use store::{ConfigStore, IniFileStore, StoreDocument, StoreError};

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Baud rates accepted by the modems
pub const ALLOWED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200];

/// Baud rate used when the configured one is not allowed
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Data bits used when the configured value is not positive
pub const DEFAULT_DATA_BITS: u32 = 8;

/// Identity of one of the two managed modem links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChannelName {
    Acoustic,
    Light,
}

impl ChannelName {
    /// Both channels, in settings-file order
    pub const ALL: [ChannelName; 2] = [ChannelName::Acoustic, ChannelName::Light];

    /// Section name used in the settings file
    pub fn section(&self) -> &'static str {
        match self {
            ChannelName::Acoustic => "AcousticModem",
            ChannelName::Light => "LightModem",
        }
    }

    /// Default port for this channel on the current platform
    pub fn default_port(&self) -> &'static str {
        DEFAULT_PORTS.get(self).copied().unwrap_or(FALLBACK_PORT)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelName::Acoustic => write!(f, "Acoustic"),
            ChannelName::Light => write!(f, "Light"),
        }
    }
}

/// Error returned when a string names no known channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel '{0}' (expected 'acoustic' or 'light')")]
pub struct UnknownChannel(pub String);

impl FromStr for ChannelName {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "acoustic" | "acousticmodem" | "a" => Ok(ChannelName::Acoustic),
            "light" | "lightmodem" | "l" => Ok(ChannelName::Light),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}

#[cfg(windows)]
const FALLBACK_PORT: &str = "COM1";
#[cfg(not(windows))]
const FALLBACK_PORT: &str = "/dev/ttyS0";

/// Seed table of default ports per channel
static DEFAULT_PORTS: Lazy<HashMap<ChannelName, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    #[cfg(windows)]
    {
        m.insert(ChannelName::Acoustic, "COM4");
        m.insert(ChannelName::Light, "COM6");
    }
    #[cfg(not(windows))]
    {
        m.insert(ChannelName::Acoustic, "/dev/ttyUSB0");
        m.insert(ChannelName::Light, "/dev/ttyUSB1");
    }
    m
});

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    /// Decode the persisted code (1 or 2)
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(StopBits::One),
            2 => Some(StopBits::Two),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Parity {
    /// Decode the persisted code (0 = none, 1 = odd, 2 = even)
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Parity::None),
            1 => Some(Parity::Odd),
            2 => Some(Parity::Even),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
        }
    }
}

/// Parameters of one modem link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelConfig {
    /// Which link this configuration belongs to
    name: ChannelName,
    /// Serial port identifier (e.g., COM4, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate, one of [`ALLOWED_BAUD_RATES`]
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: u32,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl ChannelConfig {
    /// Default configuration for a channel
    pub fn defaults(name: ChannelName) -> Self {
        Self {
            name,
            port: name.default_port().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }

    /// Default configuration on a different port
    pub fn new(name: ChannelName, port: &str) -> Self {
        Self {
            port: port.to_string(),
            ..Self::defaults(name)
        }
    }

    pub fn name(&self) -> ChannelName {
        self.name
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_data_bits(mut self, data_bits: u32) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// This configuration with every field repaired
    pub fn validated(self) -> Self {
        let name = self.name;
        validate(self, name)
    }
}

/// Check whether a baud rate is in the allow-list
pub fn is_allowed_baud_rate(baud_rate: u32) -> bool {
    ALLOWED_BAUD_RATES.contains(&baud_rate)
}

/// Check a port identifier against the platform naming convention
pub fn is_platform_port_name(port: &str) -> bool {
    if cfg!(windows) {
        let upper = port.to_uppercase();
        let number = upper
            .strip_prefix(r"\\.\COM")
            .or_else(|| upper.strip_prefix("COM"));
        matches!(number, Some(n) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    } else {
        // Whitespace and control characters would not survive the settings file
        let device_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-');
        matches!(port.strip_prefix("/dev/"), Some(rest) if !rest.is_empty() && rest.chars().all(device_char))
    }
}

/// Repair a configuration so every field is usable.
///
/// Never fails, and `validate(validate(c, n), n) == validate(c, n)`. The
/// result always carries `name`, which also selects the default port.
pub fn validate(cfg: ChannelConfig, name: ChannelName) -> ChannelConfig {
    let port = if is_platform_port_name(&cfg.port) {
        cfg.port
    } else {
        name.default_port().to_string()
    };

    let baud_rate = if is_allowed_baud_rate(cfg.baud_rate) {
        cfg.baud_rate
    } else {
        DEFAULT_BAUD_RATE
    };

    let data_bits = if cfg.data_bits > 0 {
        cfg.data_bits
    } else {
        DEFAULT_DATA_BITS
    };

    ChannelConfig {
        name,
        port,
        baud_rate,
        data_bits,
        stop_bits: cfg.stop_bits,
        parity: cfg.parity,
    }
}
