//! jzfuse-mmio - `/dev/mem` register window for the JZ4780 EFUSE
//!
//! [`PhysMap`] maps the controller's registers and implements
//! [`RegisterBus`](jzfuse_core::hal::RegisterBus) with volatile 32-bit
//! accesses.
//!
//! # Options
//!
//! - `base=0x134100d0` - physical address of the register window
//! - `window=0x2c` - size of the register window
//!
//! Both default to the JZ4780 values.

pub mod error;
pub mod physmap;

pub use error::{MmioError, Result};
pub use physmap::PhysMap;

/// Physical address of the JZ4780 EFUSE controller
pub const DEFAULT_BASE: u64 = 0x1341_00D0;

/// Size of the EFUSE register window
pub const DEFAULT_WINDOW: usize = jzfuse_core::regs::WINDOW_SIZE;

/// Where to find the register window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioConfig {
    /// Physical base address
    pub base: u64,
    /// Window size in bytes
    pub window: usize,
}

impl Default for MmioConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            window: DEFAULT_WINDOW,
        }
    }
}

impl MmioConfig {
    /// Map the configured window
    pub fn open(&self) -> Result<PhysMap> {
        if self.window < DEFAULT_WINDOW {
            return Err(MmioError::InvalidParameter(format!(
                "window {:#x} is smaller than the {:#x}-byte register set",
                self.window, DEFAULT_WINDOW
            )));
        }
        let map = PhysMap::new(self.base, self.window)?;
        log::info!("mmio: EFUSE registers at {:#x}", self.base);
        Ok(map)
    }
}

/// Parse a number with an optional `0x` prefix
pub fn parse_number(value: &str) -> Option<u64> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Apply `key=value` options on top of `config`
///
/// Keys other than `base` and `window` are left for other backends.
pub fn parse_options(mut config: MmioConfig, options: &[(&str, &str)]) -> Result<MmioConfig> {
    for (key, value) in options {
        match *key {
            "base" => {
                config.base = parse_number(value).ok_or_else(|| {
                    MmioError::InvalidParameter(format!("Invalid base value: {}", value))
                })?;
            }
            "window" => {
                config.window = parse_number(value)
                    .and_then(|w| usize::try_from(w).ok())
                    .ok_or_else(|| {
                        MmioError::InvalidParameter(format!("Invalid window value: {}", value))
                    })?;
            }
            _ => {}
        }
    }
    Ok(config)
}
