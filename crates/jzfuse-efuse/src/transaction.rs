//! Single-quantum register transactions
//!
//! Each step of a transaction takes the register lock on its own, so the
//! VDDQ watchdog can get in while a status poll is sleeping.

use jzfuse_core::hal::{Delay, RegisterBus, VddqLine};
use jzfuse_core::regs::{self, efudata, Ctrl, State, DATA_WORDS};
use jzfuse_core::{Error, Result};

use crate::{lock, Efuse};

impl<B, L, D> Efuse<B, L, D>
where
    B: RegisterBus + Send + 'static,
    L: VddqLine + Send + 'static,
    D: Delay,
{
    /// Read `out.len()` bytes (at most one quantum) at `offset`
    ///
    /// On timeout `out` is left untouched.
    pub(crate) fn read_quantum(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let len = out.len();
        log::trace!("read quantum 0x{:03X}+{}", offset, len);

        self.with_bus(|bus| {
            bus.modify32(regs::EFUCFG, |cfg| {
                regs::cfg_with_read_timing(cfg, &self.profile)
            })
        });
        self.with_bus(|bus| {
            bus.modify32(regs::EFUCTRL, |ctrl| {
                regs::ctrl_with_target(ctrl, offset, len) | Ctrl::RD_EN.bits()
            })
        });

        if !self.wait_for(State::RD_DONE) {
            log::error!("EFUSE read timed out at 0x{:03X}", offset);
            return Err(Error::HardwareTimeout { offset });
        }

        let count = word_count(len);
        let mut words = [0u32; DATA_WORDS];
        self.with_bus(|bus| {
            for (i, word) in words[..count].iter_mut().enumerate() {
                *word = bus.read32(efudata(i));
            }
        });
        regs::unpack_words(&words[..count], out);

        Ok(())
    }

    /// Program `data` (at most one quantum) at `offset`
    ///
    /// Once VDDQ has been raised, lowering it and clearing `PG_EN` always
    /// happen, whatever the outcome of the cycle.
    pub(crate) fn program_quantum(&self, offset: usize, data: &[u8]) -> Result<()> {
        let len = data.len();
        log::debug!("program quantum 0x{:03X}+{}", offset, len);

        let mut words = [0u32; DATA_WORDS];
        let count = regs::pack_words(data, &mut words);

        self.with_bus(|bus| {
            bus.modify32(regs::EFUCFG, |cfg| {
                regs::cfg_with_write_timing(cfg, &self.profile)
            })
        });
        self.with_bus(|bus| {
            for (i, &word) in words[..count].iter().enumerate() {
                bus.write32(efudata(i), word);
            }
        });
        self.with_bus(|bus| {
            bus.modify32(regs::EFUCTRL, |ctrl| regs::ctrl_with_target(ctrl, offset, len))
        });
        self.with_bus(|bus| bus.modify32(regs::EFUCTRL, |ctrl| ctrl | Ctrl::PG_EN.bits()));

        let raised = self.sequencer.raise(&mut lock(&self.hw).supply);
        let done = match raised {
            Ok(()) => {
                self.with_bus(|bus| bus.modify32(regs::EFUCTRL, |ctrl| ctrl | Ctrl::WR_EN.bits()));
                self.wait_for(State::WR_DONE)
            }
            Err(_) => false,
        };

        let lowered = self.sequencer.lower(&mut lock(&self.hw).supply);
        self.with_bus(|bus| bus.modify32(regs::EFUCTRL, |ctrl| ctrl & !Ctrl::PG_EN.bits()));

        raised?;
        lowered?;
        if !done {
            log::error!("EFUSE program timed out at 0x{:03X}", offset);
            return Err(Error::HardwareTimeout { offset });
        }

        Ok(())
    }

    /// Poll `EFUSTATE` until `bit` is set or the budget runs out
    fn wait_for(&self, bit: State) -> bool {
        for _ in 0..self.poll.attempts {
            let state = self.with_bus(|bus| State::from_bits_retain(bus.read32(regs::EFUSTATE)));
            if state.contains(bit) {
                return true;
            }
            self.delay.delay_us(self.poll.interval_us);
        }
        false
    }
}

/// Data buffer words used by a quantum of `len` bytes
fn word_count(len: usize) -> usize {
    if len % 4 == 0 {
        len / 4
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EfuseConfig;
    use jzfuse_core::hal::{NoDelay, PollBudget, StdDelay};
    use jzfuse_dummy::DummyEfuse;
    use std::time::Duration;

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(32), 8);
        assert_eq!(word_count(4), 1);
        assert_eq!(word_count(3), 1);
        assert_eq!(word_count(1), 1);
    }

    #[test]
    fn test_read_programs_read_timing() {
        let hw = DummyEfuse::with_data(&[0x12, 0x34, 0x56]);
        let efuse = Efuse::attach_with_delay(
            hw.clone(),
            Some(hw.vddq()),
            &EfuseConfig::new(512_000_000),
            NoDelay,
        )
        .unwrap();

        let mut out = [0u8; 3];
        efuse.read_quantum(0, &mut out).unwrap();
        assert_eq!(out, [0x12, 0x34, 0x56]);

        assert_eq!(regs::CFG_RD_ADJ.get(hw.cfg()), 9);
        assert_eq!(regs::CFG_RD_STROBE.get(hw.cfg()), 9);
        assert_eq!(regs::ctrl_target(hw.ctrl()), (0, 3));
    }

    #[test]
    fn test_program_programs_write_timing() {
        let hw = DummyEfuse::new();
        let efuse = Efuse::attach_with_delay(
            hw.clone(),
            Some(hw.vddq()),
            &EfuseConfig::new(185_000_000),
            NoDelay,
        )
        .unwrap();

        efuse.program_quantum(0x3E0, &[0xA5; 32]).unwrap();
        assert_eq!(&hw.fuses()[0x3E0..], &[0xA5; 32]);
        assert_eq!(regs::CFG_WR_ADJ.get(hw.cfg()), 15);
        assert_eq!(regs::CFG_WR_STROBE.get(hw.cfg()), 170);

        let ctrl = Ctrl::from_bits_retain(hw.ctrl());
        assert!(ctrl.contains(Ctrl::CS));
        assert!(!ctrl.contains(Ctrl::PG_EN));
    }

    #[test]
    fn test_watchdog_forces_supply_off() {
        let hw = DummyEfuse::new();
        let config = EfuseConfig {
            poll: PollBudget::new(40, 5_000),
            vddq_timeout: Duration::from_millis(20),
            ..EfuseConfig::new(200_000_000)
        };
        let efuse =
            Efuse::attach_with_delay(hw.clone(), Some(hw.vddq()), &config, StdDelay).unwrap();
        hw.set_stuck_writes(true);

        // The poll sleeps for 200 ms, far past the 20 ms fail-safe
        assert_eq!(
            efuse.program_quantum(0x40, &[1]),
            Err(Error::HardwareTimeout { offset: 0x40 })
        );
        assert_eq!(efuse.watchdog_trips(), 1);
        // attach, raise, watchdog, lower
        assert_eq!(hw.vddq().history(), vec![false, true, false, false]);
        assert!(!efuse.vddq_asserted());
    }
}
