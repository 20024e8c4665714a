//! Backend registration and dispatch
//!
//! A backend supplies the register window and the VDDQ enable line the
//! engine is attached to. Backends are selected with a string of the form
//! `name[:key=value,...]`, e.g.
//! `mmio:base=0x134100d0,gpiochip=0,line=7,clock=200M`.
//!
//! Options given this way override the configuration file.

use std::collections::HashMap;
use std::error::Error;

use jzfuse_core::hal::{RegisterBus, VddqLine};
use jzfuse_efuse::{Efuse, EfuseConfig};

use crate::config::{self, Config};

/// Engine over whichever backend was selected at runtime
pub type EfuseHandle = Efuse<Box<dyn RegisterBus + Send>, Box<dyn VddqLine + Send>>;

/// Information about a backend
pub struct BackendInfo {
    /// Name used on the command line
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        description: "In-memory EFUSE emulator for testing (image=<file> to preload)",
    });

    #[cfg(feature = "mmio")]
    backends.push(BackendInfo {
        name: "mmio",
        description: "JZ4780 registers via /dev/mem, VDDQ via GPIO (base=,window=,gpiochip=|dev=,line=,active_low=) - requires root",
    });

    backends
}

/// Parsed backend string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name
    pub name: String,
    /// `key=value` options
    pub params: HashMap<String, String>,
}

impl BackendParams {
    /// Options as borrowed pairs, the form the backend crates take
    pub fn options(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// Look up one option
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Split `name:key=value,key=value` into its parts
pub fn parse_backend_params(s: &str) -> Result<BackendParams, Box<dyn Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                );
            }
        }
    }

    Ok(BackendParams {
        name: name.to_string(),
        params,
    })
}

/// Engine parameters from the config file and the `clock=` option
pub fn efuse_config(params: &BackendParams, config: &Config) -> Result<EfuseConfig, Box<dyn Error>> {
    let clock_rate = match params.get("clock") {
        Some(clock) => config::parse_frequency(clock)?,
        None => config.board.clock_hz,
    };

    Ok(EfuseConfig {
        poll: config.poll.into(),
        ..EfuseConfig::new(clock_rate)
    })
}

/// Open the backend named in `backend` and attach the engine to it
pub fn open_efuse(backend: &str, config: &Config) -> Result<EfuseHandle, Box<dyn Error>> {
    let params = parse_backend_params(backend)?;
    let efuse_config = efuse_config(&params, config)?;

    let (bus, vddq) = match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params)?,
        #[cfg(feature = "mmio")]
        "mmio" => open_mmio(&params, config)?,
        name => {
            let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
            return Err(format!(
                "Unknown backend '{}' (available: {})",
                name,
                names.join(", ")
            )
            .into());
        }
    };

    log::debug!("Attaching EFUSE engine via '{}'", params.name);
    Ok(Efuse::attach(bus, Some(vddq), &efuse_config)?)
}

type Parts = (Box<dyn RegisterBus + Send>, Box<dyn VddqLine + Send>);

#[cfg(feature = "dummy")]
fn open_dummy(params: &BackendParams) -> Result<Parts, Box<dyn Error>> {
    use jzfuse_dummy::DummyEfuse;

    let efuse = match params.get("image") {
        Some(path) => {
            let image = std::fs::read(path)?;
            log::info!("dummy: preloaded {} bytes from {}", image.len(), path);
            DummyEfuse::with_data(&image)
        }
        None => DummyEfuse::new(),
    };
    let vddq = efuse.vddq();

    Ok((Box::new(efuse), Box::new(vddq)))
}

#[cfg(feature = "mmio")]
fn open_mmio(params: &BackendParams, config: &Config) -> Result<Parts, Box<dyn Error>> {
    use jzfuse_linux_gpio::{GpioVddq, GpioVddqConfig};
    use jzfuse_mmio::MmioConfig;

    let options = params.options();
    let board = &config.board;

    let mmio = jzfuse_mmio::parse_options(
        MmioConfig {
            base: board.base,
            window: usize::try_from(board.window)?,
        },
        &options,
    )?;

    let gpio = jzfuse_linux_gpio::parse_options(
        GpioVddqConfig {
            device: board
                .gpiochip
                .map(|n| format!("/dev/gpiochip{}", n))
                .unwrap_or_default(),
            line: board.vddq_line,
            active_low: board.active_low,
        },
        &options,
    )?;

    let map = mmio.open()?;
    let vddq = GpioVddq::open(&gpio)?;

    Ok((Box::new(map), Box::new(vddq)))
}
