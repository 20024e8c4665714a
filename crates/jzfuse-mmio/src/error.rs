//! Error types for the MMIO backend

use thiserror::Error;

/// Errors from mapping the EFUSE register window
#[derive(Debug, Error)]
pub enum MmioError {
    /// Failed to open the physical memory device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// mmap of the register window failed
    #[error("Failed to map memory at {address:#x} (size {size}): {source}")]
    MapFailed {
        address: u64,
        size: usize,
        #[source]
        source: std::io::Error,
    },

    /// Register window base is not 32-bit aligned
    #[error("Register base {0:#x} is not 4-byte aligned")]
    Unaligned(u64),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Physical memory access is not available on this platform
    #[error("{0}")]
    NotSupported(&'static str),
}

/// Result type for MMIO operations
pub type Result<T> = std::result::Result<T, MmioError>;
