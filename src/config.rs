//! Board configuration file
//!
//! Describes where the EFUSE controller and its VDDQ switch live on a
//! board, in TOML format:
//!
//! ```toml
//! [board]
//! base = 0x134100d0
//! window = 0x2c
//! gpiochip = 0
//! vddq_line = 7
//! active_low = true
//! clock_hz = "200M"
//!
//! [poll]
//! attempts = 1000
//! interval_us = 100
//! ```
//!
//! Every key is optional. Backend options given on the command line take
//! precedence over the file.

use std::fs;
use std::path::{Path, PathBuf};

use jzfuse_core::hal::PollBudget;
use serde::Deserialize;
use thiserror::Error;

/// Physical address of the JZ4780 EFUSE controller
pub const DEFAULT_BASE: u64 = 0x1341_00D0;
/// Size of the EFUSE register window
pub const DEFAULT_WINDOW: u64 = jzfuse_core::regs::WINDOW_SIZE as u64;
/// AHB2 clock of the JZ4780 reference boards
pub const DEFAULT_CLOCK_HZ: u64 = 200_000_000;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unexpected keys
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Board wiring
    pub board: BoardConfig,
    /// Status poll budget
    pub poll: PollConfig,
}

/// `[board]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    /// Physical base of the register window
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub base: u64,
    /// Size of the register window
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub window: u64,
    /// GPIO chip number carrying the VDDQ enable line
    pub gpiochip: Option<u32>,
    /// Line offset of the VDDQ enable signal
    pub vddq_line: Option<u32>,
    /// Polarity of the VDDQ enable signal
    pub active_low: bool,
    /// Bus clock feeding the controller
    #[serde(deserialize_with = "deserialize_frequency")]
    pub clock_hz: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            window: DEFAULT_WINDOW,
            gpiochip: None,
            vddq_line: None,
            active_low: true,
            clock_hz: DEFAULT_CLOCK_HZ,
        }
    }
}

/// `[poll]` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Status reads before a transaction times out
    pub attempts: u32,
    /// Sleep between status reads
    pub interval_us: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        let budget = PollBudget::default();
        Self {
            attempts: budget.attempts,
            interval_us: budget.interval_us,
        }
    }
}

impl From<PollConfig> for PollBudget {
    fn from(poll: PollConfig) -> Self {
        PollBudget::new(poll.attempts, poll.interval_us)
    }
}

impl Config {
    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value '{}': {}", s, e))
    } else {
        s.parse::<u64>()
            .map_err(|e| format!("Invalid number '{}': {}", s, e))
    }
}

/// Parse a frequency such as `200M`, `200MHz`, `185000k` or `200000000`
pub fn parse_frequency(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    let digits = lower.strip_suffix("hz").unwrap_or(&lower);

    let (digits, multiplier) = if let Some(n) = digits.strip_suffix('g') {
        (n, 1_000_000_000)
    } else if let Some(n) = digits.strip_suffix('m') {
        (n, 1_000_000)
    } else if let Some(n) = digits.strip_suffix('k') {
        (n, 1_000)
    } else {
        (digits, 1)
    };

    parse_number(digits)
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| format!("Invalid frequency: {}", s))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(u64),
    Str(String),
}

/// Deserialize a u64 that can be hex (0x...) or decimal
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Int(n) => Ok(n),
        NumberOrString::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Deserialize a frequency given in Hz or with a k/M/G suffix
fn deserialize_frequency<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Int(n) => Ok(n),
        NumberOrString::Str(s) => parse_frequency(&s).map_err(serde::de::Error::custom),
    }
}
