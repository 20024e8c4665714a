//! jzfuse-core - Core library for JZ4780 EFUSE access
//!
//! This crate holds everything about the EFUSE block that does not need an
//! operating system: the timing profile derived from the AHB2 clock, the
//! transfer chunker, the typed register map, the write-once check, the
//! segment map and the traits the hardware backends implement. It is
//! `no_std` compatible so the same logic can run in a boot loader.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation for the owned segment helpers
//!
//! # Example
//!
//! ```
//! use jzfuse_core::chunk::Quanta;
//! use jzfuse_core::timing::TimingProfile;
//!
//! let profile = TimingProfile::from_clock_rate(200_000_000).unwrap();
//! assert_eq!(profile.wr_strobe, 320);
//!
//! let sizes: Vec<usize> = Quanta::new(0x20, 37).map(|q| q.len).collect();
//! assert_eq!(sizes, [32, 4, 1]);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod chunk;
pub mod error;
pub mod guard;
pub mod hal;
pub mod regs;
pub mod segment;
pub mod timing;

pub use error::{Error, Result};

/// Size of the EFUSE array in bytes (8 Kbit)
pub const EFUSE_SIZE: usize = 1024;

/// First hardware address of the array
pub const EFUSE_START_ADDR: u32 = 0x200;

/// Last hardware address of the array
pub const EFUSE_END_ADDR: u32 = 0x5FF;
