//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal usize
fn parse_hex_usize(s: &str) -> Result<usize, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<usize>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "jzfuse")]
#[command(author, version, about = "JZ4780 OTP EFUSE reader and programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board configuration file (TOML format)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend to use, with optional key=value options
    /// (e.g. mmio:gpiochip=0,line=7,clock=200M or dummy)
    #[arg(short, long, global = true, default_value = "mmio")]
    pub backend: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read EFUSE contents
    Read {
        /// Start offset within the array (hex or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_usize)]
        offset: usize,

        /// Number of bytes to read (defaults to the rest of the array)
        #[arg(long, value_parser = parse_hex_usize)]
        length: Option<usize>,

        /// Output file path (hex dump to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Program a file into the EFUSE (irreversible)
    Write {
        /// Start offset within the array (hex or decimal)
        #[arg(long, value_parser = parse_hex_usize)]
        offset: usize,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show or program the Ingenic chip ID
    ChipId {
        /// Four 32-bit hex words to program, e.g. "1c2d3e4f 0 0 deadbeef"
        value: Option<String>,
    },

    /// Show or program the customer ID
    UserId {
        /// Four 32-bit hex words to program, e.g. "1c2d3e4f 0 0 deadbeef"
        value: Option<String>,
    },

    /// Dump one named segment
    Segment {
        /// Segment name (see `segments`)
        name: String,
    },

    /// List the EFUSE segment map
    Segments,

    /// Show timing profile, protection bits and engine state
    Info,

    /// List available backends
    ListBackends,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_read() {
        let cli = Cli::parse_from([
            "jzfuse", "-b", "dummy", "read", "--offset", "0x20", "--length", "16",
        ]);
        assert_eq!(cli.backend, "dummy");
        match cli.command {
            Commands::Read {
                offset,
                length,
                output,
            } => {
                assert_eq!(offset, 0x20);
                assert_eq!(length, Some(16));
                assert!(output.is_none());
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_parse_ids() {
        let cli = Cli::parse_from(["jzfuse", "user-id", "1 2 3 4", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.backend, "mmio");
        assert!(matches!(cli.command, Commands::UserId { value: Some(ref v) } if v == "1 2 3 4"));

        let cli = Cli::parse_from(["jzfuse", "chip-id"]);
        assert!(matches!(cli.command, Commands::ChipId { value: None }));
    }

    #[test]
    fn test_parse_hex_usize() {
        assert_eq!(parse_hex_usize("0x3ff"), Ok(0x3FF));
        assert_eq!(parse_hex_usize("1024"), Ok(1024));
        assert!(parse_hex_usize("0xg").is_err());
    }
}
