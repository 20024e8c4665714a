//! JZ4780 EFUSE controller register map
//!
//! Register offsets and bit definitions from the JZ4780 programmer's
//! manual. Multi-bit fields are described by [`Field`] so that callers
//! never shift and mask by hand.

use bitflags::bitflags;

use crate::timing::TimingProfile;

// ============================================================================
// Register offsets
// ============================================================================

/// Control register
pub const EFUCTRL: usize = 0x00;
/// Configuration register (strobe timing)
pub const EFUCFG: usize = 0x04;
/// Status register
pub const EFUSTATE: usize = 0x08;
/// First data buffer register
pub const EFUDATA0: usize = 0x0C;
/// Number of data buffer registers
pub const DATA_WORDS: usize = 8;
/// Size of the register window in bytes
pub const WINDOW_SIZE: usize = EFUDATA0 + DATA_WORDS * 4;

/// Offset of data buffer register `n`
pub const fn efudata(n: usize) -> usize {
    EFUDATA0 + n * 4
}

/// Offsets from this one up are addressed through chip select 1
pub const CS_BOUNDARY: usize = 0x200;

// ============================================================================
// Fields
// ============================================================================

/// A multi-bit field inside a 32-bit register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Bit position of the least significant bit
    pub shift: u32,
    /// Width in bits
    pub width: u32,
}

impl Field {
    /// Create a field descriptor
    pub const fn new(shift: u32, width: u32) -> Self {
        Self { shift, width }
    }

    /// Largest value the field can hold
    pub const fn max(&self) -> u32 {
        (1 << self.width) - 1
    }

    /// Mask of the field in register position
    pub const fn mask(&self) -> u32 {
        self.max() << self.shift
    }

    /// Extract the field from a register value
    pub const fn get(&self, reg: u32) -> u32 {
        (reg >> self.shift) & self.max()
    }

    /// Replace the field in a register value, truncating `value` to width
    pub const fn set(&self, reg: u32, value: u32) -> u32 {
        (reg & !self.mask()) | ((value & self.max()) << self.shift)
    }
}

/// EFUCTRL: address inside the selected half of the array
pub const CTRL_ADDR: Field = Field::new(21, 9);
/// EFUCTRL: transfer length minus one
pub const CTRL_LEN: Field = Field::new(16, 5);

/// EFUCFG: read address-adjust
pub const CFG_RD_ADJ: Field = Field::new(20, 4);
/// EFUCFG: read strobe
pub const CFG_RD_STROBE: Field = Field::new(16, 4);
/// EFUCFG: write address-adjust
pub const CFG_WR_ADJ: Field = Field::new(12, 4);
/// EFUCFG: write strobe
pub const CFG_WR_STROBE: Field = Field::new(0, 12);

bitflags! {
    /// EFUCTRL single-bit controls
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Ctrl: u32 {
        /// Chip select of the upper half
        const CS    = 1 << 30;
        /// Program enable
        const PG_EN = 1 << 15;
        /// Write (program cycle) enable
        const WR_EN = 1 << 1;
        /// Read enable
        const RD_EN = 1 << 0;

        const _ = !0;
    }
}

bitflags! {
    /// EFUCFG single-bit controls
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cfg: u32 {
        /// Interrupt on completion
        const INT_EN = 1 << 31;

        const _ = !0;
    }
}

bitflags! {
    /// EFUSTATE bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct State: u32 {
        /// Whole array is write protected
        const GLOBAL_PRT = 1 << 15;
        /// Chip ID segment is write protected
        const CHIPID_PRT = 1 << 14;
        /// Customer ID segment is write protected
        const CUSTID_PRT = 1 << 13;
        /// Program cycle finished
        const WR_DONE    = 1 << 1;
        /// Read cycle finished
        const RD_DONE    = 1 << 0;

        const _ = !0;
    }
}

impl State {
    /// Only the protection bits
    pub fn protection(self) -> State {
        self & (State::GLOBAL_PRT | State::CHIPID_PRT | State::CUSTID_PRT)
    }
}

// ============================================================================
// Register value builders
// ============================================================================

/// Bits cleared in EFUCTRL before a new transaction is set up
const CTRL_TRANSACTION_MASK: u32 = CTRL_ADDR.mask()
    | CTRL_LEN.mask()
    | Ctrl::CS.bits()
    | Ctrl::PG_EN.bits()
    | Ctrl::WR_EN.bits()
    | Ctrl::RD_EN.bits();

/// EFUCFG with the read timing of `profile` applied
pub fn cfg_with_read_timing(cfg: u32, profile: &TimingProfile) -> u32 {
    let cfg = CFG_RD_ADJ.set(cfg, profile.rd_adj);
    CFG_RD_STROBE.set(cfg, profile.rd_strobe)
}

/// EFUCFG with the write timing of `profile` applied
pub fn cfg_with_write_timing(cfg: u32, profile: &TimingProfile) -> u32 {
    let cfg = CFG_WR_ADJ.set(cfg, profile.wr_adj);
    CFG_WR_STROBE.set(cfg, profile.wr_strobe)
}

/// EFUCTRL addressing `len` bytes at array `offset`, with every enable bit
/// cleared
pub fn ctrl_with_target(ctrl: u32, offset: usize, len: usize) -> u32 {
    debug_assert!((1..=DATA_WORDS * 4).contains(&len));

    let mut ctrl = ctrl & !CTRL_TRANSACTION_MASK;
    if offset >= CS_BOUNDARY {
        ctrl |= Ctrl::CS.bits();
    }
    let ctrl = CTRL_ADDR.set(ctrl, (offset % CS_BOUNDARY) as u32);
    CTRL_LEN.set(ctrl, (len - 1) as u32)
}

/// Array offset and length currently addressed by an EFUCTRL value
pub fn ctrl_target(ctrl: u32) -> (usize, usize) {
    let half = if Ctrl::from_bits_retain(ctrl).contains(Ctrl::CS) {
        CS_BOUNDARY
    } else {
        0
    };
    (
        half + CTRL_ADDR.get(ctrl) as usize,
        CTRL_LEN.get(ctrl) as usize + 1,
    )
}

/// Mask selecting the low `len` bytes of a data word
pub const fn byte_mask(len: usize) -> u32 {
    if len >= 4 {
        u32::MAX
    } else {
        (1u32 << (8 * len)) - 1
    }
}

/// Pack a quantum into data buffer words
///
/// A quantum that is a multiple of four fills whole words; anything else
/// is a single partial word masked to `data.len()` bytes. Returns the
/// number of words used.
pub fn pack_words(data: &[u8], words: &mut [u32; DATA_WORDS]) -> usize {
    if data.len() % 4 == 0 {
        for (word, chunk) in words.iter_mut().zip(data.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        data.len() / 4
    } else {
        let mut raw = [0u8; 4];
        let len = data.len().min(4);
        raw[..len].copy_from_slice(&data[..len]);
        words[0] = u32::from_le_bytes(raw) & byte_mask(len);
        1
    }
}

/// Unpack data buffer words into `out` using the same rule as
/// [`pack_words`]
pub fn unpack_words(words: &[u32], out: &mut [u8]) {
    if out.len() % 4 == 0 {
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    } else {
        let len = out.len().min(4);
        let word = words.first().copied().unwrap_or(0) & byte_mask(len);
        out[..len].copy_from_slice(&word.to_le_bytes()[..len]);
    }
}
