//! jzfuse-dummy - In-memory EFUSE controller emulator for testing
//!
//! This crate emulates the JZ4780 EFUSE controller behind its register
//! window, together with the VDDQ enable line. It's useful for testing and
//! development without real hardware.
//!
//! The emulator follows the controller's observable behaviour:
//!
//! - writing `EFUCTRL` with `RD_EN` copies the addressed bytes into the
//!   data buffer registers and sets `RD_DONE`
//! - a rising `WR_EN` while `PG_EN` is set runs a program cycle: if VDDQ is
//!   on, the data buffer is ORed into the array; `WR_DONE` is set either way
//! - [`DummyEfuse::set_stuck`] and [`DummyEfuse::set_stuck_writes`] keep
//!   the done bits from coming up
//!
//! [`DummyEfuse`] and [`DummyVddq`] are cheap handles onto shared state, so
//! a test can keep a clone around to inspect the array after handing the
//! originals to the engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jzfuse_core::error::{Error, Result};
use jzfuse_core::hal::{RegisterBus, VddqLine};
use jzfuse_core::regs::{self, Ctrl, State, DATA_WORDS};
use jzfuse_core::EFUSE_SIZE;

/// Counters kept by the emulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Read cycles started
    pub reads: usize,
    /// Program cycles started with VDDQ on
    pub programs: usize,
    /// Program cycles started with VDDQ off (nothing was burned)
    pub unpowered_programs: usize,
}

struct Model {
    fuses: Vec<u8>,
    ctrl: u32,
    cfg: u32,
    state: u32,
    data: [u32; DATA_WORDS],
    vddq: bool,
    vddq_history: Vec<bool>,
    fail_vddq: bool,
    stuck_reads: bool,
    stuck_writes: bool,
    stats: DummyStats,
}

impl Model {
    fn handle_ctrl(&mut self, value: u32) {
        let old = Ctrl::from_bits_retain(self.ctrl);
        let new = Ctrl::from_bits_retain(value);
        self.ctrl = value;

        if new.contains(Ctrl::RD_EN) {
            self.state &= !State::RD_DONE.bits();
            self.start_read();
        }

        if new.contains(Ctrl::PG_EN | Ctrl::WR_EN) && !old.contains(Ctrl::WR_EN) {
            self.state &= !State::WR_DONE.bits();
            self.start_program();
        }
    }

    fn start_read(&mut self) {
        let (offset, len) = regs::ctrl_target(self.ctrl);
        self.stats.reads += 1;
        log::trace!("dummy: read {} bytes at 0x{:03X}", len, offset);

        for (i, word) in self.data.iter_mut().enumerate() {
            let mut raw = [0u8; 4];
            for (j, byte) in raw.iter_mut().enumerate() {
                let pos = i * 4 + j;
                if pos < len && offset + pos < EFUSE_SIZE {
                    *byte = self.fuses[offset + pos];
                }
            }
            *word = u32::from_le_bytes(raw);
        }

        if !self.stuck_reads {
            self.state |= State::RD_DONE.bits();
        }
    }

    fn start_program(&mut self) {
        let (offset, len) = regs::ctrl_target(self.ctrl);

        if self.vddq {
            self.stats.programs += 1;
            log::trace!("dummy: program {} bytes at 0x{:03X}", len, offset);
            for pos in 0..len.min(EFUSE_SIZE.saturating_sub(offset)) {
                let byte = (self.data[pos / 4] >> ((pos % 4) * 8)) as u8;
                self.fuses[offset + pos] |= byte;
            }
        } else {
            self.stats.unpowered_programs += 1;
            log::warn!("dummy: program cycle at 0x{:03X} without VDDQ", offset);
        }

        if !self.stuck_writes {
            self.state |= State::WR_DONE.bits();
        }
    }
}

fn lock(model: &Mutex<Model>) -> MutexGuard<'_, Model> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emulated EFUSE register window
#[derive(Clone)]
pub struct DummyEfuse {
    model: Arc<Mutex<Model>>,
}

impl DummyEfuse {
    /// Create a blank (all-zero) array
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(Model {
                fuses: vec![0; EFUSE_SIZE],
                ctrl: 0,
                cfg: 0,
                state: 0,
                data: [0; DATA_WORDS],
                vddq: false,
                vddq_history: Vec::new(),
                fail_vddq: false,
                stuck_reads: false,
                stuck_writes: false,
                stats: DummyStats::default(),
            })),
        }
    }

    /// Create an array pre-filled with `initial` from offset 0
    pub fn with_data(initial: &[u8]) -> Self {
        let efuse = Self::new();
        {
            let mut model = lock(&efuse.model);
            let len = initial.len().min(EFUSE_SIZE);
            model.fuses[..len].copy_from_slice(&initial[..len]);
        }
        efuse
    }

    /// VDDQ enable line wired to this controller
    pub fn vddq(&self) -> DummyVddq {
        DummyVddq {
            model: Arc::clone(&self.model),
        }
    }

    /// Copy of the fuse array
    pub fn fuses(&self) -> Vec<u8> {
        lock(&self.model).fuses.clone()
    }

    /// Keep the done bits from ever being set
    pub fn set_stuck(&self, stuck: bool) {
        let mut model = lock(&self.model);
        model.stuck_reads = stuck;
        model.stuck_writes = stuck;
    }

    /// Keep `WR_DONE` from ever being set, reads still complete
    pub fn set_stuck_writes(&self, stuck: bool) {
        lock(&self.model).stuck_writes = stuck;
    }

    /// Set the protection bits reported in `EFUSTATE`
    pub fn set_protection(&self, protection: State) {
        let mut model = lock(&self.model);
        model.state = (model.state & !State::all().protection().bits()) | protection.protection().bits();
    }

    /// Current `EFUCFG` value
    pub fn cfg(&self) -> u32 {
        lock(&self.model).cfg
    }

    /// Current `EFUCTRL` value
    pub fn ctrl(&self) -> u32 {
        lock(&self.model).ctrl
    }

    /// Counters
    pub fn stats(&self) -> DummyStats {
        lock(&self.model).stats
    }
}

impl Default for DummyEfuse {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for DummyEfuse {
    fn read32(&mut self, offset: usize) -> u32 {
        let model = lock(&self.model);
        match offset {
            regs::EFUCTRL => model.ctrl,
            regs::EFUCFG => model.cfg,
            regs::EFUSTATE => model.state,
            o if (regs::EFUDATA0..regs::WINDOW_SIZE).contains(&o) && o % 4 == 0 => {
                model.data[(o - regs::EFUDATA0) / 4]
            }
            _ => {
                log::warn!("dummy: read of unknown register 0x{:02X}", offset);
                0
            }
        }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        let mut model = lock(&self.model);
        match offset {
            regs::EFUCTRL => model.handle_ctrl(value),
            regs::EFUCFG => model.cfg = value,
            regs::EFUSTATE => {}
            o if (regs::EFUDATA0..regs::WINDOW_SIZE).contains(&o) && o % 4 == 0 => {
                model.data[(o - regs::EFUDATA0) / 4] = value;
            }
            _ => log::warn!("dummy: write of unknown register 0x{:02X}", offset),
        }
    }
}

/// Emulated VDDQ enable line
///
/// Records every level it is driven to.
#[derive(Clone)]
pub struct DummyVddq {
    model: Arc<Mutex<Model>>,
}

impl DummyVddq {
    /// Whether the supply is currently on
    pub fn is_enabled(&self) -> bool {
        lock(&self.model).vddq
    }

    /// Every level the line was driven to, oldest first
    pub fn history(&self) -> Vec<bool> {
        lock(&self.model).vddq_history.clone()
    }

    /// Number of off-to-on transitions
    pub fn raise_count(&self) -> usize {
        count_edges(&lock(&self.model).vddq_history, true)
    }

    /// Number of on-to-off transitions
    pub fn lower_count(&self) -> usize {
        count_edges(&lock(&self.model).vddq_history, false)
    }

    /// Make every following `set_enabled(true)` fail
    pub fn set_failing(&self, failing: bool) {
        lock(&self.model).fail_vddq = failing;
    }
}

fn count_edges(history: &[bool], to: bool) -> usize {
    let mut level = false;
    let mut edges = 0;
    for &next in history {
        if next != level && next == to {
            edges += 1;
        }
        level = next;
    }
    edges
}

impl VddqLine for DummyVddq {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let mut model = lock(&self.model);
        if enabled && model.fail_vddq {
            return Err(Error::PowerControl);
        }
        model.vddq = enabled;
        model.vddq_history.push(enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jzfuse_core::regs::{ctrl_with_target, efudata};

    #[test]
    fn test_read_cycle() {
        let mut initial = vec![0u8; 0x24];
        initial[0x20..0x24].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        let mut efuse = DummyEfuse::with_data(&initial);

        let ctrl = ctrl_with_target(0, 0x20, 4) | Ctrl::RD_EN.bits();
        efuse.write32(regs::EFUCTRL, ctrl);

        assert_ne!(efuse.read32(regs::EFUSTATE) & State::RD_DONE.bits(), 0);
        assert_eq!(efuse.read32(efudata(0)), 0xDDCC_BBAA);
        assert_eq!(efuse.stats().reads, 1);
    }

    #[test]
    fn test_program_needs_vddq() {
        let mut efuse = DummyEfuse::new();
        let mut vddq = efuse.vddq();

        efuse.write32(efudata(0), 0x0000_00F0);
        let ctrl = ctrl_with_target(0, 0x10, 1) | Ctrl::PG_EN.bits();
        efuse.write32(regs::EFUCTRL, ctrl);
        efuse.write32(regs::EFUCTRL, ctrl | Ctrl::WR_EN.bits());
        assert_eq!(efuse.fuses()[0x10], 0);
        assert_eq!(efuse.stats().unpowered_programs, 1);

        vddq.set_enabled(true).unwrap();
        efuse.write32(regs::EFUCTRL, ctrl);
        efuse.write32(regs::EFUCTRL, ctrl | Ctrl::WR_EN.bits());
        vddq.set_enabled(false).unwrap();

        assert_eq!(efuse.fuses()[0x10], 0xF0);
        assert_eq!(efuse.fuses()[0x11], 0);
        assert_eq!(vddq.history(), vec![true, false]);
        assert_eq!((vddq.raise_count(), vddq.lower_count()), (1, 1));
    }

    #[test]
    fn test_stuck_status() {
        let mut efuse = DummyEfuse::new();
        efuse.set_stuck(true);
        efuse.write32(regs::EFUCTRL, ctrl_with_target(0, 0, 4) | Ctrl::RD_EN.bits());
        assert_eq!(efuse.read32(regs::EFUSTATE) & State::RD_DONE.bits(), 0);
    }

    #[test]
    fn test_protection_bits() {
        let mut efuse = DummyEfuse::new();
        efuse.set_protection(State::CHIPID_PRT);
        assert_eq!(
            State::from_bits_retain(efuse.read32(regs::EFUSTATE)).protection(),
            State::CHIPID_PRT
        );
    }
}
