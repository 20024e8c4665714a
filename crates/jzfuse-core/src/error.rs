//! Error types for jzfuse-core
//!
//! This module provides a no_std compatible error type that is shared by
//! the engine and every backend.

use core::fmt;

/// Timing bound that could not be derived from the clock rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingBound {
    /// Minimum read address-adjust
    MinReadAdjust,
    /// Minimum read strobe (adjust + strobe)
    MinReadStrobe,
    /// Minimum write address-adjust
    MinWriteAdjust,
    /// Minimum write strobe (adjust + strobe)
    MinWriteStrobe,
    /// Maximum write strobe (adjust + strobe)
    MaxWriteStrobe,
    /// Derived read strobe does not fit its 4-bit field
    ReadStrobe,
    /// Derived write strobe does not fit its 12-bit field
    WriteStrobe,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Attach errors
    /// Bus clock rate is outside the supported 185-512 MHz band
    UnsupportedClock {
        /// Rate that was offered, in Hz
        rate: u64,
    },
    /// A timing bound or derived timing field overflowed its bit width
    TimingOutOfRange(TimingBound),
    /// No VDDQ enable line was supplied at attach time
    NoPowerControl,

    // Request errors
    /// Requested range extends past the end of the array
    OutOfRange {
        /// Offset of the request
        offset: usize,
        /// Length of the request
        len: usize,
    },
    /// The request would re-program bits that are already fused
    AlreadyProgrammed {
        /// Offset of the rejected quantum
        offset: usize,
    },
    /// Segment value is not four 32-bit hex words
    InvalidSegmentFormat,
    /// No segment with the given name exists
    UnknownSegment,

    // Hardware errors
    /// The done bit in the status register never came up
    HardwareTimeout {
        /// Offset of the quantum that timed out
        offset: usize,
    },
    /// Driving the VDDQ enable line failed
    PowerControl,
    /// Could not acquire a transfer buffer
    AllocationFailure,
}

impl fmt::Display for TimingBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinReadAdjust => write!(f, "min RD_ADJ"),
            Self::MinReadStrobe => write!(f, "min RD_STROBE"),
            Self::MinWriteAdjust => write!(f, "min WR_ADJ"),
            Self::MinWriteStrobe => write!(f, "min WR_STROBE"),
            Self::MaxWriteStrobe => write!(f, "max WR_STROBE"),
            Self::ReadStrobe => write!(f, "read strobe"),
            Self::WriteStrobe => write!(f, "write strobe"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedClock { rate } => {
                write!(f, "clock rate {} Hz not between 185 MHz and 512 MHz", rate)
            }
            Self::TimingOutOfRange(bound) => write!(f, "cannot calculate {}", bound),
            Self::NoPowerControl => write!(f, "no VDDQ enable line"),
            Self::OutOfRange { offset, len } => write!(
                f,
                "range 0x{:03X}+{} is beyond the end of the efuse",
                offset, len
            ),
            Self::AlreadyProgrammed { offset } => {
                write!(f, "efuse at 0x{:03X} has already been written", offset)
            }
            Self::InvalidSegmentFormat => {
                write!(f, "expected four 32-bit hex words separated by spaces")
            }
            Self::UnknownSegment => write!(f, "unknown segment"),
            Self::HardwareTimeout { offset } => {
                write!(f, "timed out waiting for efuse at 0x{:03X}", offset)
            }
            Self::PowerControl => write!(f, "failed to drive VDDQ enable line"),
            Self::AllocationFailure => write!(f, "could not allocate transfer buffer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
