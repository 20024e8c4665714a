//! EFUSE strobe timing derived from the AHB2 clock
//!
//! The fuse macro is accessed with read/write strobes whose width is
//! counted in AHB2 clock cycles. The programmer's manual gives the
//! electrical windows in nanoseconds; this module turns them into the four
//! fields of the `EFUCFG` register.
//!
//! All arithmetic is unsigned 32-bit with truncating division and
//! wrap-around subtraction, reproducing the reference tables exactly. Do
//! not "fix" the wrapping: the read strobe derivation relies on it at the
//! low end of the clock band.

use crate::error::{Error, Result, TimingBound};

/// Lowest supported AHB2 clock rate in Hz
pub const MIN_CLOCK_RATE: u64 = 185_000_000;

/// Highest supported AHB2 clock rate in Hz (11 us maximum strobe)
pub const MAX_CLOCK_RATE: u64 = 512_000_000;

/// Widest value of a 4-bit adjust field
pub const ADJ_MAX: u32 = 0xF;
/// Widest value of the 4-bit read strobe field
pub const RD_STROBE_MAX: u32 = 0xF;
/// Widest value of the 12-bit write strobe field
pub const WR_STROBE_MAX: u32 = 0xFFF;

/// Shortest read strobe the controller accepts
const RD_STROBE_FLOOR: u32 = 7;

/// Hardware-mandated bounds, in clock cycles, for the current clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingBounds {
    /// Minimum read address-adjust
    pub min_rd_adj: u32,
    /// Minimum read adjust + strobe
    pub min_rd_adj_strobe: u32,
    /// Minimum write address-adjust
    pub min_wr_adj: u32,
    /// Minimum write adjust + strobe
    pub min_wr_adj_strobe: u32,
    /// Maximum write adjust + strobe
    pub max_wr_adj_strobe: u32,
}

impl TimingBounds {
    /// Compute the bounds for a clock of `mhz` MHz.
    ///
    /// This does not apply the supported clock band, only the bit-width
    /// limits of each bound.
    pub fn from_mhz(mhz: u32) -> Result<Self> {
        let min_rd_adj = (6500u32.wrapping_mul(mhz) / 1_000_000 + 1).wrapping_sub(1);
        check(min_rd_adj, ADJ_MAX, TimingBound::MinReadAdjust)?;

        let min_rd_adj_strobe = (35000u32.wrapping_mul(mhz) / 1_000_000 + 1).wrapping_sub(5);
        check(
            min_rd_adj_strobe,
            ADJ_MAX + RD_STROBE_MAX,
            TimingBound::MinReadStrobe,
        )?;

        let min_wr_adj = (6500u32.wrapping_mul(mhz) / 1_000_000 + 1).wrapping_sub(1);
        check(min_wr_adj, ADJ_MAX, TimingBound::MinWriteAdjust)?;

        let min_wr_adj_strobe = (9u32.wrapping_mul(mhz) + 1).wrapping_sub(1666);
        check(
            min_wr_adj_strobe,
            WR_STROBE_MAX + ADJ_MAX,
            TimingBound::MinWriteStrobe,
        )?;

        let max_wr_adj_strobe = (11u32.wrapping_mul(mhz) + 1).wrapping_sub(1666);
        check(
            max_wr_adj_strobe,
            WR_STROBE_MAX + ADJ_MAX,
            TimingBound::MaxWriteStrobe,
        )?;

        Ok(Self {
            min_rd_adj,
            min_rd_adj_strobe,
            min_wr_adj,
            min_wr_adj_strobe,
            max_wr_adj_strobe,
        })
    }
}

fn check(value: u32, max: u32, bound: TimingBound) -> Result<()> {
    if value > max {
        log::error!("cannot calculate {} ({} > {})", bound, value, max);
        return Err(Error::TimingOutOfRange(bound));
    }
    Ok(())
}

/// Timing fields programmed into `EFUCFG`
///
/// Computed once at attach time and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingProfile {
    /// Read address-adjust (4 bits)
    pub rd_adj: u32,
    /// Read strobe (4 bits)
    pub rd_strobe: u32,
    /// Write address-adjust (4 bits)
    pub wr_adj: u32,
    /// Write strobe (12 bits)
    pub wr_strobe: u32,
    /// Bounds the fields were derived from
    pub bounds: TimingBounds,
}

impl TimingProfile {
    /// Derive the profile for a bus clock of `rate` Hz
    pub fn from_clock_rate(rate: u64) -> Result<Self> {
        if !(MIN_CLOCK_RATE..=MAX_CLOCK_RATE).contains(&rate) {
            log::error!("clock rate {} not between 185M-512M", rate);
            return Err(Error::UnsupportedClock { rate });
        }

        let bounds = TimingBounds::from_mhz((rate / 1_000_000) as u32)?;
        Self::from_bounds(bounds)
    }

    /// Derive the profile from precomputed bounds
    pub fn from_bounds(bounds: TimingBounds) -> Result<Self> {
        let rd_adj = (bounds.min_rd_adj + ADJ_MAX) / 2;
        let tmp = bounds.min_rd_adj_strobe.wrapping_sub(rd_adj);
        let rd_strobe = (tmp.wrapping_add(ADJ_MAX) / 2).max(RD_STROBE_FLOOR);
        if rd_strobe > RD_STROBE_MAX {
            log::error!("can't calculate read strobe ({})", rd_strobe);
            return Err(Error::TimingOutOfRange(TimingBound::ReadStrobe));
        }

        let avg = (bounds.min_wr_adj_strobe + bounds.max_wr_adj_strobe) / 2;
        let wr_adj = avg.min(ADJ_MAX);
        let wr_strobe = avg - wr_adj;
        if wr_strobe > WR_STROBE_MAX {
            log::error!("can't calculate write strobe ({})", wr_strobe);
            return Err(Error::TimingOutOfRange(TimingBound::WriteStrobe));
        }

        Ok(Self {
            rd_adj,
            rd_strobe,
            wr_adj,
            wr_strobe,
            bounds,
        })
    }

    /// Log the profile and its bounds
    pub fn dump(&self) {
        log::info!("rd_adj = {:x}", self.rd_adj);
        log::info!("rd_strobe = {:x}", self.rd_strobe);
        log::info!("wr_adj = {:x}", self.wr_adj);
        log::info!("wr_strobe = {:x}", self.wr_strobe);
        log::info!("min_rd_adj = {:x}", self.bounds.min_rd_adj);
        log::info!("min_rd_adj_strobe = {:x}", self.bounds.min_rd_adj_strobe);
        log::info!("min_wr_adj = {:x}", self.bounds.min_wr_adj);
        log::info!("min_wr_adj_strobe = {:x}", self.bounds.min_wr_adj_strobe);
        log::info!("max_wr_adj_strobe = {:x}", self.bounds.max_wr_adj_strobe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_200mhz() {
        let p = TimingProfile::from_clock_rate(200_000_000).unwrap();
        assert_eq!(p.bounds.min_rd_adj, 1);
        assert_eq!(p.bounds.min_rd_adj_strobe, 3);
        assert_eq!(p.bounds.min_wr_adj, 1);
        assert_eq!(p.bounds.min_wr_adj_strobe, 135);
        assert_eq!(p.bounds.max_wr_adj_strobe, 535);
        assert_eq!((p.rd_adj, p.rd_strobe, p.wr_adj, p.wr_strobe), (8, 7, 15, 320));
    }

    #[test]
    fn test_profile_band_edges() {
        let low = TimingProfile::from_clock_rate(185_000_000).unwrap();
        assert_eq!(low.bounds.min_wr_adj_strobe, 0);
        assert_eq!((low.rd_adj, low.rd_strobe, low.wr_adj, low.wr_strobe), (8, 7, 15, 170));

        let high = TimingProfile::from_clock_rate(512_000_000).unwrap();
        assert_eq!(high.bounds.min_rd_adj, 3);
        assert_eq!(high.bounds.min_rd_adj_strobe, 13);
        assert_eq!(
            (high.rd_adj, high.rd_strobe, high.wr_adj, high.wr_strobe),
            (9, 9, 15, 3440)
        );
    }

    #[test]
    fn test_profile_fits_fields_across_band() {
        for mhz in 185..=512u64 {
            let p = TimingProfile::from_clock_rate(mhz * 1_000_000).unwrap();
            assert!(p.rd_adj <= ADJ_MAX);
            assert!(p.rd_strobe <= RD_STROBE_MAX && p.rd_strobe >= 7);
            assert!(p.wr_adj <= ADJ_MAX);
            assert!(p.wr_strobe <= WR_STROBE_MAX);
        }
    }

    #[test]
    fn test_unsupported_clock() {
        assert_eq!(
            TimingProfile::from_clock_rate(184_999_999),
            Err(Error::UnsupportedClock { rate: 184_999_999 })
        );
        assert_eq!(
            TimingProfile::from_clock_rate(512_000_001),
            Err(Error::UnsupportedClock { rate: 512_000_001 })
        );
        assert!(TimingProfile::from_clock_rate(0).is_err());
    }

    #[test]
    fn test_bounds_overflow() {
        // Below the band the read strobe bound wraps around
        assert_eq!(
            TimingBounds::from_mhz(100),
            Err(Error::TimingOutOfRange(TimingBound::MinReadStrobe))
        );
        // Far above it the read strobe needs more than 4+4 bits
        assert_eq!(
            TimingBounds::from_mhz(1000),
            Err(Error::TimingOutOfRange(TimingBound::MinReadStrobe))
        );
        assert_eq!(
            TimingBounds::from_mhz(2500),
            Err(Error::TimingOutOfRange(TimingBound::MinReadAdjust))
        );
    }

    #[test]
    fn test_write_strobe_overflow() {
        let bounds = TimingBounds {
            min_rd_adj: 1,
            min_rd_adj_strobe: 3,
            min_wr_adj: 1,
            min_wr_adj_strobe: 0x100F,
            max_wr_adj_strobe: 0x100F,
        };
        assert_eq!(
            TimingProfile::from_bounds(bounds),
            Err(Error::TimingOutOfRange(TimingBound::WriteStrobe))
        );
    }
}
