//! jzfuse-efuse - JZ4780 EFUSE access engine
//!
//! [`Efuse`] is one attached controller instance. It owns the register
//! window, the timing profile derived from the bus clock, the VDDQ enable
//! line with its fail-safe watchdog and the open-handle counter.
//!
//! Reads and writes go through the chunker, one hardware quantum at a
//! time, in increasing address order. Every write quantum is read back
//! first and refused if it would touch bytes that are already fused.
//!
//! ```
//! use jzfuse_dummy::DummyEfuse;
//! use jzfuse_efuse::{Efuse, EfuseConfig};
//!
//! let hw = DummyEfuse::new();
//! let efuse = Efuse::attach(hw.clone(), Some(hw.vddq()), &EfuseConfig::new(200_000_000))?;
//!
//! efuse.write_range(0x20, &[0xAA, 0xBB, 0xCC, 0xDD])?;
//! assert_eq!(efuse.read_range(0x20, 4)?, [0xAA, 0xBB, 0xCC, 0xDD]);
//! # Ok::<(), jzfuse_efuse::Error>(())
//! ```

mod file;
mod power;
mod transaction;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jzfuse_core::chunk::{Quanta, MAX_QUANTUM};
use jzfuse_core::guard;
use jzfuse_core::hal::{Delay, PollBudget, RegisterBus, StdDelay, VddqLine};
use jzfuse_core::regs::{self, State};
use jzfuse_core::segment::{self, IdString, Segment, ID_LEN};
use jzfuse_core::timing::TimingProfile;
use jzfuse_core::EFUSE_SIZE;

pub use file::EfuseFile;
pub use jzfuse_core::{Error, Result};

use power::{Sequencer, Supply};

/// How long VDDQ may stay raised before the watchdog forces it off
pub const DEFAULT_VDDQ_TIMEOUT: Duration = Duration::from_secs(1);

/// Attach-time parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfuseConfig {
    /// Bus clock feeding the controller, in Hz
    pub clock_rate: u64,
    /// Status poll budget for every transaction
    pub poll: PollBudget,
    /// Fail-safe timeout of the programming supply
    pub vddq_timeout: Duration,
}

impl EfuseConfig {
    /// Defaults for the given bus clock
    pub fn new(clock_rate: u64) -> Self {
        Self {
            clock_rate,
            poll: PollBudget::default(),
            vddq_timeout: DEFAULT_VDDQ_TIMEOUT,
        }
    }
}

/// Everything behind the register lock
pub(crate) struct Hardware<B, L> {
    pub(crate) bus: B,
    pub(crate) supply: Supply<L>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic in another thread must not keep the supply from being lowered
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Attached EFUSE controller
pub struct Efuse<B, L, D = StdDelay>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    hw: Arc<Mutex<Hardware<B, L>>>,
    /// Held for a whole range transfer
    transfer: Mutex<()>,
    sequencer: Sequencer,
    profile: TimingProfile,
    poll: PollBudget,
    delay: D,
    use_count: AtomicUsize,
}

impl<B, L> Efuse<B, L, StdDelay>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
{
    /// Attach to a controller, sleeping between status polls
    pub fn attach(bus: B, vddq: Option<L>, config: &EfuseConfig) -> Result<Self> {
        Self::attach_with_delay(bus, vddq, config, StdDelay)
    }
}

impl<B, L, D> Efuse<B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    /// Attach to a controller
    ///
    /// Derives the timing profile from `config.clock_rate`, takes the VDDQ
    /// enable line and drives it off, then starts the fail-safe watchdog.
    pub fn attach_with_delay(bus: B, vddq: Option<L>, config: &EfuseConfig, delay: D) -> Result<Self> {
        let profile = TimingProfile::from_clock_rate(config.clock_rate)?;

        let line = vddq.ok_or_else(|| {
            log::error!("no VDDQ enable line, refusing to attach");
            Error::NoPowerControl
        })?;

        // Power off by default
        let mut supply = Supply::new(line);
        supply.drive()?;

        let hw = Arc::new(Mutex::new(Hardware { bus, supply }));
        let sequencer = Sequencer::spawn(Arc::clone(&hw), config.vddq_timeout)?;

        log::info!("EFUSE attached, bus clock {} Hz", config.clock_rate);
        profile.dump();

        Ok(Self {
            hw,
            transfer: Mutex::new(()),
            sequencer,
            profile,
            poll: config.poll,
            delay,
            use_count: AtomicUsize::new(0),
        })
    }

    /// Stop the watchdog, make sure VDDQ is off and release the hardware
    ///
    /// Dropping the engine does the same.
    pub fn detach(self) {
        drop(self);
    }

    fn release(&mut self) {
        if !self.sequencer.shutdown() {
            return;
        }

        let mut hw = lock(&self.hw);
        if hw.supply.is_asserted() {
            log::warn!("VDDQ still raised at detach, lowering");
            if let Err(e) = self.sequencer.lower(&mut hw.supply) {
                log::error!("failed to lower VDDQ at detach: {}", e);
            }
        }
        log::debug!("EFUSE detached");
    }

    /// Timing profile in use
    pub fn profile(&self) -> &TimingProfile {
        &self.profile
    }

    /// Protection bits currently reported by the controller
    pub fn protection(&self) -> State {
        let state = self.with_bus(|bus| bus.read32(regs::EFUSTATE));
        State::from_bits_retain(state).protection()
    }

    /// Number of live [`EfuseFile`] handles
    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Relaxed)
    }

    /// Whether the programming supply is currently raised
    pub fn vddq_asserted(&self) -> bool {
        lock(&self.hw).supply.is_asserted()
    }

    /// Number of times the watchdog had to force VDDQ off
    pub fn watchdog_trips(&self) -> usize {
        lock(&self.hw).supply.trips()
    }

    /// Open a byte-stream handle positioned at offset 0
    pub fn open(&self) -> EfuseFile<'_, B, L, D> {
        EfuseFile::new(self)
    }

    // ------------------------------------------------------------------
    // Byte stream
    // ------------------------------------------------------------------

    /// Read `len` bytes starting at `offset`
    pub fn read_range(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        check_range(offset, len)?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailure)?;
        buf.resize(len, 0);

        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` from `offset`
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        self.read_tracked(offset, buf, &mut done)
    }

    /// Program `data` at `offset`
    ///
    /// Quanta are committed one by one. On error, the ones before the
    /// failing quantum stay programmed.
    pub fn write_range(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut done = 0;
        self.write_tracked(offset, data, &mut done)
    }

    /// Read into `buf`, adding the bytes of every completed quantum to `done`
    pub(crate) fn read_tracked(&self, offset: usize, buf: &mut [u8], done: &mut usize) -> Result<()> {
        check_range(offset, buf.len())?;
        let _transfer = lock(&self.transfer);

        for q in Quanta::new(offset, buf.len()) {
            let start = q.offset - offset;
            self.read_quantum(q.offset, &mut buf[start..start + q.len])?;
            *done += q.len;
        }

        Ok(())
    }

    /// Program `data`, adding the bytes of every committed quantum to `done`
    pub(crate) fn write_tracked(&self, offset: usize, data: &[u8], done: &mut usize) -> Result<()> {
        check_range(offset, data.len())?;
        let _transfer = lock(&self.transfer);

        for q in Quanta::new(offset, data.len()) {
            let start = q.offset - offset;
            let new = &data[start..start + q.len];

            let mut current = [0u8; MAX_QUANTUM];
            let current = &mut current[..q.len];
            self.read_quantum(q.offset, current)?;

            if let Some(i) = guard::first_conflict(current, new) {
                log::error!(
                    "EFUSE 0x{:03X} already programmed (0x{:02X}), refusing 0x{:02X}",
                    q.offset + i,
                    current[i],
                    new[i]
                );
                return Err(Error::AlreadyProgrammed { offset: q.offset });
            }

            self.program_quantum(q.offset, new)?;
            *done += q.len;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Segments
    // ------------------------------------------------------------------

    /// Read a whole segment
    pub fn read_segment(&self, segment: &Segment) -> Result<Vec<u8>> {
        self.read_range(segment.offset, segment.len)
    }

    /// Read a 128-bit ID segment as four hex words
    pub fn show_id(&self, segment: &Segment) -> Result<IdString> {
        if segment.len != ID_LEN {
            return Err(Error::InvalidSegmentFormat);
        }
        let mut bytes = [0u8; ID_LEN];
        self.read_at(segment.offset, &mut bytes)?;
        Ok(segment::format_id(&bytes))
    }

    /// Program a 128-bit ID segment from four hex words
    pub fn store_id(&self, segment: &Segment, text: &str) -> Result<()> {
        if segment.len != ID_LEN {
            return Err(Error::InvalidSegmentFormat);
        }
        let bytes = segment::parse_id(text)?;
        self.write_range(segment.offset, &bytes)
    }

    /// Ingenic chip ID
    pub fn chip_id(&self) -> Result<IdString> {
        self.show_id(&segment::CHIP_ID)
    }

    /// Program the chip ID
    pub fn set_chip_id(&self, text: &str) -> Result<()> {
        self.store_id(&segment::CHIP_ID, text)
    }

    /// Customer ID
    pub fn user_id(&self) -> Result<IdString> {
        self.show_id(&segment::USER_ID)
    }

    /// Program the customer ID
    pub fn set_user_id(&self, text: &str) -> Result<()> {
        self.store_id(&segment::USER_ID, text)
    }

    pub(crate) fn with_bus<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        let mut hw = lock(&self.hw);
        f(&mut hw.bus)
    }
}

impl<B, L, D> Drop for Efuse<B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    fn drop(&mut self) {
        self.release();
    }
}

fn check_range(offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= EFUSE_SIZE => Ok(()),
        _ => {
            log::error!(
                "EFUSE range 0x{:X}+{} exceeds {} bytes",
                offset,
                len,
                EFUSE_SIZE
            );
            Err(Error::OutOfRange { offset, len })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jzfuse_core::hal::NoDelay;
    use jzfuse_dummy::{DummyEfuse, DummyVddq};

    type TestEfuse = Efuse<DummyEfuse, DummyVddq, NoDelay>;

    fn attach(hw: &DummyEfuse) -> TestEfuse {
        Efuse::attach_with_delay(
            hw.clone(),
            Some(hw.vddq()),
            &EfuseConfig::new(200_000_000),
            NoDelay,
        )
        .unwrap()
    }

    #[test]
    fn test_attach_checks() {
        let hw = DummyEfuse::new();
        let config = EfuseConfig::new(100_000_000);
        assert_eq!(
            TestEfuse::attach_with_delay(hw.clone(), Some(hw.vddq()), &config, NoDelay).err(),
            Some(Error::UnsupportedClock { rate: 100_000_000 })
        );

        let config = EfuseConfig::new(200_000_000);
        assert_eq!(
            TestEfuse::attach_with_delay(hw.clone(), None, &config, NoDelay).err(),
            Some(Error::NoPowerControl)
        );
    }

    #[test]
    fn test_attach_powers_off() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);
        assert_eq!(hw.vddq().history(), vec![false]);
        assert!(!efuse.vddq_asserted());
        assert_eq!(efuse.profile().wr_strobe, 320);
    }

    #[test]
    fn test_round_trip() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);

        let data: Vec<u8> = (1..=70).collect();
        efuse.write_range(0x1F0, &data).unwrap();

        assert_eq!(efuse.read_range(0x1F0, 70).unwrap(), data);
        assert_eq!(&hw.fuses()[0x1F0..0x1F0 + 70], &data[..]);
        // 70 bytes: 32 + 32 + 4 + 2, each a read-back plus a program
        assert_eq!(hw.stats().programs, 4);
        assert_eq!(hw.vddq().raise_count(), 4);
        assert_eq!(hw.vddq().lower_count(), 4);
        assert!(!hw.vddq().is_enabled());
    }

    #[test]
    fn test_scenario_200mhz() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);

        efuse.write_range(0x20, &[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        assert_eq!(efuse.read_range(0x20, 4).unwrap(), [0xAA, 0xBB, 0xCC, 0xDD]);

        assert_eq!(
            efuse.write_range(0x20, &[0x01, 0x00, 0x00, 0x00]),
            Err(Error::AlreadyProgrammed { offset: 0x20 })
        );
        assert_eq!(&hw.fuses()[0x20..0x24], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_double_program_rejected() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);
        let pattern = [0x5A; 8];

        efuse.write_range(0x100, &pattern).unwrap();
        let programs = hw.stats().programs;

        assert_eq!(
            efuse.write_range(0x100, &pattern),
            Err(Error::AlreadyProgrammed { offset: 0x100 })
        );
        assert_eq!(&hw.fuses()[0x100..0x108], &pattern);
        assert_eq!(hw.stats().programs, programs);
        assert_eq!(hw.vddq().raise_count(), 1);
    }

    #[test]
    fn test_partial_commit() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);

        efuse.write_range(0x40, &[0x11; 4]).unwrap();
        // First quantum 0x20..0x40 is blank, second one collides
        assert_eq!(
            efuse.write_range(0x20, &[0x22; 64]),
            Err(Error::AlreadyProgrammed { offset: 0x40 })
        );
        assert_eq!(&hw.fuses()[0x20..0x40], &[0x22; 32]);
        assert_eq!(&hw.fuses()[0x40..0x44], &[0x11; 4]);
        assert_eq!(hw.fuses()[0x44], 0);
    }

    #[test]
    fn test_bounds() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);

        assert!(efuse.read_range(0x3FC, 4).is_ok());
        assert!(efuse.write_range(0x3FC, &[1, 2, 3, 4]).is_ok());
        assert_eq!(
            efuse.read_range(0x3FC, 5),
            Err(Error::OutOfRange { offset: 0x3FC, len: 5 })
        );
        assert_eq!(
            efuse.write_range(0x3FD, &[0; 4]),
            Err(Error::OutOfRange { offset: 0x3FD, len: 4 })
        );
        assert!(matches!(
            efuse.read_range(usize::MAX, 2),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(efuse.read_range(EFUSE_SIZE, 0).unwrap(), Vec::<u8>::new());
        assert_eq!(efuse.read_range(0, EFUSE_SIZE).unwrap().len(), EFUSE_SIZE);
    }

    #[test]
    fn test_upper_half_uses_chip_select() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);

        efuse.write_range(0x300, &[0xC3, 0x3C]).unwrap();
        assert_eq!(&hw.fuses()[0x300..0x302], &[0xC3, 0x3C]);
        assert_eq!(&hw.fuses()[0x100..0x102], &[0, 0]);
        assert_eq!(regs::ctrl_target(hw.ctrl()).0, 0x300);
    }

    #[test]
    fn test_stuck_read_times_out() {
        let hw = DummyEfuse::with_data(&[0xFF; 8]);
        let efuse = attach(&hw);
        hw.set_stuck(true);

        let mut buf = [0u8; 8];
        assert_eq!(
            efuse.read_at(0, &mut buf),
            Err(Error::HardwareTimeout { offset: 0 })
        );
        assert_eq!(buf, [0; 8]);

        // The read-back fails, so the program path is never entered
        assert_eq!(
            efuse.write_range(0x80, &[1, 2, 3, 4]),
            Err(Error::HardwareTimeout { offset: 0x80 })
        );
        assert_eq!(hw.vddq().raise_count(), 0);
    }

    #[test]
    fn test_stuck_program_powers_down_once() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);
        hw.set_stuck_writes(true);

        assert_eq!(
            efuse.write_range(0x80, &[1, 2, 3, 4]),
            Err(Error::HardwareTimeout { offset: 0x80 })
        );
        assert_eq!(hw.vddq().history(), vec![false, true, false]);
        assert!(!efuse.vddq_asserted());
        assert!(!regs::Ctrl::from_bits_retain(hw.ctrl()).contains(regs::Ctrl::PG_EN));
        assert_eq!(efuse.watchdog_trips(), 0);
    }

    #[test]
    fn test_power_failure_cleans_up() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);
        hw.vddq().set_failing(true);

        assert_eq!(efuse.write_range(0x10, &[0xAB]), Err(Error::PowerControl));
        assert_eq!(hw.fuses()[0x10], 0);
        assert!(!efuse.vddq_asserted());
        assert_eq!(regs::ctrl_target(hw.ctrl()), (0x10, 1));
        assert!(!regs::Ctrl::from_bits_retain(hw.ctrl()).contains(regs::Ctrl::PG_EN));
    }

    #[test]
    fn test_ids() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);

        assert_eq!(
            efuse.chip_id().unwrap().as_str(),
            "00000000 00000000 00000000 00000000"
        );
        efuse.set_user_id("1c2d3e4f 0 0x12345678 deadbeef").unwrap();
        assert_eq!(
            efuse.user_id().unwrap().as_str(),
            "1c2d3e4f 00000000 12345678 deadbeef"
        );
        assert_eq!(&hw.fuses()[0x18..0x1C], &[0x4F, 0x3E, 0x2D, 0x1C]);

        assert_eq!(efuse.set_chip_id("1 2 3"), Err(Error::InvalidSegmentFormat));
        assert_eq!(
            efuse.store_id(&segment::RANDOM, "1 2 3 4"),
            Err(Error::InvalidSegmentFormat)
        );
        assert_eq!(efuse.read_segment(&segment::PROTECT).unwrap(), vec![0]);
    }

    #[test]
    fn test_protection() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);
        hw.set_protection(State::GLOBAL_PRT);
        assert_eq!(efuse.protection(), State::GLOBAL_PRT);
    }

    #[test]
    fn test_concurrent_writers() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);

        std::thread::scope(|s| {
            for i in 0..4usize {
                let efuse = &efuse;
                s.spawn(move || {
                    let data = [i as u8 + 1; 64];
                    efuse.write_range(0x200 + i * 64, &data).unwrap();
                });
            }
        });

        let fuses = hw.fuses();
        for i in 0..4usize {
            assert!(fuses[0x200 + i * 64..0x240 + i * 64]
                .iter()
                .all(|&b| b == i as u8 + 1));
        }
        assert!(!hw.vddq().is_enabled());
    }

    #[test]
    fn test_detach_lowers_supply() {
        let hw = DummyEfuse::new();
        let efuse = attach(&hw);
        efuse.write_range(0x40, &[0x01]).unwrap();
        efuse.detach();
        assert!(!hw.vddq().is_enabled());
        assert_eq!(hw.vddq().history(), vec![false, true, false]);
    }

    #[test]
    fn test_release_idempotent() {
        let hw = DummyEfuse::new();
        let mut efuse = attach(&hw);
        efuse.release();
        efuse.release();
        drop(efuse);
        assert!(!hw.vddq().is_enabled());
    }

    #[test]
    fn test_no_program_without_watchdog() {
        let hw = DummyEfuse::new();
        let mut efuse = attach(&hw);
        efuse.release();

        assert_eq!(efuse.write_range(0x40, &[0x01]), Err(Error::PowerControl));
        assert!(!hw.vddq().history().contains(&true));
        assert_eq!(hw.fuses()[0x40], 0);
        assert_eq!(hw.stats().programs, 0);
    }
}
