//! jzfuse - JZ4780 OTP EFUSE reader and programmer
//!
//! Reads, programs and inspects the 1024-byte one-time-programmable fuse
//! array of the Ingenic JZ4780.
//!
//! # Architecture
//!
//! The CLI attaches a [`jzfuse_efuse::Efuse`] engine to a backend:
//! - **mmio** - the real controller through `/dev/mem`, with the VDDQ
//!   programming supply switched by a GPIO line
//! - **dummy** - an in-memory emulator for trying things out
//!
//! Board wiring comes from an optional TOML file and can be overridden
//! with `key=value` options on the backend string.

mod backends;
mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use jzfuse_core::segment;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Segments => {
            commands::list_segments();
            Ok(())
        }
        Commands::ListBackends => {
            list_backends();
            Ok(())
        }
        command => {
            let efuse = backends::open_efuse(&cli.backend, &config)?;
            match command {
                Commands::Read {
                    offset,
                    length,
                    output,
                } => commands::run_read(&efuse, offset, length, output.as_deref()),
                Commands::Write { offset, input } => commands::run_write(&efuse, offset, &input),
                Commands::ChipId { value } => {
                    commands::run_id(&efuse, &segment::CHIP_ID, value.as_deref())
                }
                Commands::UserId { value } => {
                    commands::run_id(&efuse, &segment::USER_ID, value.as_deref())
                }
                Commands::Segment { name } => commands::run_segment(&efuse, &name),
                Commands::Info => commands::run_info(&efuse),
                Commands::Segments | Commands::ListBackends => Ok(()),
            }
        }
    }
}

/// Print the backends compiled into this binary
fn list_backends() {
    let backends = backends::available_backends();
    if backends.is_empty() {
        println!("No backends available (recompile with backend features enabled)");
        return;
    }

    println!("Available backends:");
    for b in &backends {
        println!("  {:8} - {}", b.name, b.description);
    }
}
