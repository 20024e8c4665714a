//! Hardware access traits
//!
//! The engine talks to the hardware through three small seams:
//!
//! - [`RegisterBus`] - the EFUSE register window
//! - [`VddqLine`] - the enable line of the 2.5 V programming supply
//! - [`Delay`] - the sleep between status polls
//!
//! Backends implement these for `/dev/mem`, Linux GPIO or the in-memory
//! emulator.

use crate::error::Result;

/// 32-bit register window of the EFUSE controller
///
/// Offsets are relative to the window base (see [`crate::regs`]).
pub trait RegisterBus {
    /// Read a 32-bit register
    fn read32(&mut self, offset: usize) -> u32;

    /// Write a 32-bit register
    fn write32(&mut self, offset: usize, value: u32);

    /// Read-modify-write a 32-bit register
    fn modify32(&mut self, offset: usize, f: impl FnOnce(u32) -> u32)
    where
        Self: Sized,
    {
        let value = self.read32(offset);
        self.write32(offset, f(value));
    }
}

/// Enable line of the VDDQ programming supply
///
/// `set_enabled(true)` connects VDDQ to 2.5 V. Line polarity is the
/// implementation's concern.
pub trait VddqLine {
    /// Drive the supply on or off
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
}

/// Blocking delay used between status polls
pub trait Delay {
    /// Sleep for roughly `us` microseconds
    fn delay_us(&self, us: u32);
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    fn read32(&mut self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

impl<T: VddqLine + ?Sized> VddqLine for &mut T {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        (**self).set_enabled(enabled)
    }
}

#[cfg(feature = "alloc")]
impl<T: RegisterBus + ?Sized> RegisterBus for alloc::boxed::Box<T> {
    fn read32(&mut self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

#[cfg(feature = "alloc")]
impl<T: VddqLine + ?Sized> VddqLine for alloc::boxed::Box<T> {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        (**self).set_enabled(enabled)
    }
}

/// Bounded wait for a status bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Number of status reads before giving up
    pub attempts: u32,
    /// Sleep between two status reads, in microseconds
    pub interval_us: u32,
}

impl PollBudget {
    /// Create a budget
    pub const fn new(attempts: u32, interval_us: u32) -> Self {
        Self {
            attempts,
            interval_us,
        }
    }
}

impl Default for PollBudget {
    /// 1000 polls, 100 us apart
    fn default() -> Self {
        Self::new(1000, 100)
    }
}

/// Delay that returns immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_us(&self, _us: u32) {}
}

/// Delay backed by `std::thread::sleep`
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl Delay for StdDelay {
    fn delay_us(&self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(us as u64));
    }
}
