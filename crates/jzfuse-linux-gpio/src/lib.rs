//! jzfuse-linux-gpio - VDDQ enable line through the GPIO character device
//!
//! The JZ4780 EFUSE needs 2.5 V on VDDQ while a program cycle runs. Boards
//! switch that supply with a GPIO, active-low on the reference design.
//! [`GpioVddq`] requests that line as an output through gpiocdev, drives it
//! inactive straight away and implements
//! [`VddqLine`](jzfuse_core::hal::VddqLine).
//!
//! # Options
//!
//! - `dev=/dev/gpiochip0` - GPIO chip device path (or use `gpiochip=N`)
//! - `gpiochip=0` - GPIO chip number (alternative to `dev`)
//! - `line=N` (or `vddq=N`) - line offset of the enable signal (required)
//! - `active_low=1` - line polarity (default active-low)
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod error;

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use jzfuse_core::hal::VddqLine;

pub use error::{GpioError, Result};

/// Which line switches VDDQ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioVddqConfig {
    /// GPIO chip device path
    pub device: String,
    /// Line offset on the chip
    pub line: Option<Offset>,
    /// Whether the enable signal is active-low
    pub active_low: bool,
}

impl Default for GpioVddqConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            line: None,
            active_low: true,
        }
    }
}

/// VDDQ enable line on a GPIO chip
pub struct GpioVddq {
    request: Request,
    line: Offset,
}

impl GpioVddq {
    /// Request the line as an output, initially inactive (supply off)
    pub fn open(config: &GpioVddqConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(GpioError::NoDevice);
        }
        let line = config.line.ok_or(GpioError::MissingParameter("line"))?;

        let mut req_config = Config::default();
        req_config.with_line(line);
        if config.active_low {
            req_config.as_active_low();
        }
        req_config.as_output(Value::Inactive);

        let request = Request::from_config(req_config)
            .on_chip(&config.device)
            .with_consumer("jzfuse-vddq")
            .request()
            .map_err(|source| GpioError::LineRequestFailed {
                chip: config.device.clone(),
                line,
                source,
            })?;

        log::info!(
            "linux_gpio: VDDQ enable on {} line {} ({})",
            config.device,
            line,
            if config.active_low {
                "active-low"
            } else {
                "active-high"
            }
        );

        Ok(Self { request, line })
    }

    /// Drive the line, reporting the gpiocdev error
    pub fn set(&self, enabled: bool) -> Result<()> {
        let value = if enabled { Value::Active } else { Value::Inactive };
        self.request
            .set_value(self.line, value)
            .map_err(GpioError::SetValueFailed)
    }
}

impl VddqLine for GpioVddq {
    fn set_enabled(&mut self, enabled: bool) -> jzfuse_core::Result<()> {
        self.set(enabled).map_err(|e| {
            log::error!("linux_gpio: {}", e);
            jzfuse_core::Error::PowerControl
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(GpioError::InvalidParameter(format!(
            "Invalid {} value: {}",
            key, value
        ))),
    }
}

/// Apply `key=value` options on top of `config`
///
/// Keys that don't belong to the GPIO line are left for other backends.
pub fn parse_options(mut config: GpioVddqConfig, options: &[(&str, &str)]) -> Result<GpioVddqConfig> {
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "gpiochip" => {
                gpiochip = Some(value.parse().map_err(|_| {
                    GpioError::InvalidParameter(format!("Invalid gpiochip value: {}", value))
                })?);
            }
            "line" | "vddq" => {
                config.line = Some(value.parse().map_err(|_| {
                    GpioError::InvalidParameter(format!("Invalid line value: {}", value))
                })?);
            }
            "active_low" => {
                config.active_low = parse_bool(key, value)?;
            }
            _ => {}
        }
    }

    if let Some(n) = gpiochip {
        config.device = format!("/dev/gpiochip{}", n);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let config = parse_options(
            GpioVddqConfig::default(),
            &[("gpiochip", "3"), ("line", "17"), ("base", "0x0")],
        )
        .unwrap();
        assert_eq!(config.device, "/dev/gpiochip3");
        assert_eq!(config.line, Some(17));
        assert!(config.active_low);

        let config = parse_options(
            config,
            &[("dev", "/dev/gpiochip1"), ("vddq", "5"), ("active_low", "0")],
        )
        .unwrap();
        assert_eq!(config.device, "/dev/gpiochip1");
        assert_eq!(config.line, Some(5));
        assert!(!config.active_low);
    }

    #[test]
    fn test_parse_options_rejects() {
        assert!(matches!(
            parse_options(GpioVddqConfig::default(), &[("line", "x")]),
            Err(GpioError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_options(GpioVddqConfig::default(), &[("active_low", "maybe")]),
            Err(GpioError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_open_requires_device_and_line() {
        assert!(matches!(
            GpioVddq::open(&GpioVddqConfig::default()),
            Err(GpioError::NoDevice)
        ));
        let config = GpioVddqConfig {
            device: "/dev/gpiochip0".into(),
            ..GpioVddqConfig::default()
        };
        assert!(matches!(
            GpioVddq::open(&config),
            Err(GpioError::MissingParameter("line"))
        ));
    }
}
