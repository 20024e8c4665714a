//! EFUSE segment map and ID word format
//!
//! The 1024-byte array is divided into fixed segments. Two of them, the
//! Ingenic chip ID and the customer ID, are 128-bit identities exposed as
//! four 32-bit hex words:
//!
//! ```text
//! 1c2d3e4f 00000000 12345678 deadbeef
//! ```
//!
//! Words are stored little-endian in the array.

use core::fmt::Write;

use crate::error::{Error, Result};
use crate::EFUSE_SIZE;

/// A named region of the array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Short name used on the command line
    pub name: &'static str,
    /// Offset within the array
    pub offset: usize,
    /// Length in bytes
    pub len: usize,
    /// Human readable description
    pub description: &'static str,
}

impl Segment {
    /// One past the last byte of the segment
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Whether `offset` lies inside the segment
    pub const fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset < self.end()
    }
}

/// 64-bit random number
pub const RANDOM: Segment = Segment {
    name: "random",
    offset: 0x000,
    len: 8,
    description: "Random number",
};

/// 128-bit Ingenic chip ID
pub const CHIP_ID: Segment = Segment {
    name: "chip-id",
    offset: 0x008,
    len: 16,
    description: "Ingenic chip ID",
};

/// 128-bit customer ID
pub const USER_ID: Segment = Segment {
    name: "user-id",
    offset: 0x018,
    len: 16,
    description: "Customer ID",
};

/// Reserved area
pub const RESERVED: Segment = Segment {
    name: "reserved",
    offset: 0x028,
    len: 440,
    description: "Reserved",
};

/// Protection bits
pub const PROTECT: Segment = Segment {
    name: "protect",
    offset: 0x1E0,
    len: 1,
    description: "Protect segment",
};

/// HDMI key
pub const HDMI_KEY: Segment = Segment {
    name: "hdmi-key",
    offset: 0x1E1,
    len: 287,
    description: "HDMI key",
};

/// Secure boot key
pub const SECURE_BOOT_KEY: Segment = Segment {
    name: "secure-boot-key",
    offset: 0x300,
    len: 256,
    description: "Security boot key",
};

/// All segments in address order
pub static SEGMENTS: &[Segment] = &[
    RANDOM,
    CHIP_ID,
    USER_ID,
    RESERVED,
    PROTECT,
    HDMI_KEY,
    SECURE_BOOT_KEY,
];

/// Look up a segment by name
pub fn find(name: &str) -> Result<&'static Segment> {
    SEGMENTS
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
        .ok_or(Error::UnknownSegment)
}

/// Segment that holds `offset`
pub fn containing(offset: usize) -> Option<&'static Segment> {
    if offset >= EFUSE_SIZE {
        return None;
    }
    SEGMENTS.iter().find(|s| s.contains(offset))
}

/// Length of an ID segment in bytes
pub const ID_LEN: usize = 16;

/// Text form of an ID: four 8-digit words and three separators
pub type IdString = heapless::String<35>;

/// Split an ID into its four little-endian words
pub fn id_words(bytes: &[u8; ID_LEN]) -> [u32; 4] {
    core::array::from_fn(|i| {
        u32::from_le_bytes([
            bytes[i * 4],
            bytes[i * 4 + 1],
            bytes[i * 4 + 2],
            bytes[i * 4 + 3],
        ])
    })
}

/// Format an ID as `"%08x %08x %08x %08x"`
pub fn format_id(bytes: &[u8; ID_LEN]) -> IdString {
    let [a, b, c, d] = id_words(bytes);
    let mut s = IdString::new();
    // Always fits: 4 * 8 digits + 3 spaces
    let _ = write!(s, "{:08x} {:08x} {:08x} {:08x}", a, b, c, d);
    s
}

/// Parse four whitespace separated 32-bit hex words
///
/// Each word may carry a `0x` prefix and one to eight hex digits, with no
/// sign. Anything else, including a fifth word, is rejected.
pub fn parse_id(s: &str) -> Result<[u8; ID_LEN]> {
    let mut bytes = [0u8; ID_LEN];
    let mut tokens = s.split_whitespace();

    for chunk in bytes.chunks_exact_mut(4) {
        let token = tokens.next().ok_or(Error::InvalidSegmentFormat)?;
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidSegmentFormat);
        }
        let word = u32::from_str_radix(digits, 16).map_err(|_| Error::InvalidSegmentFormat)?;
        chunk.copy_from_slice(&word.to_le_bytes());
    }

    if tokens.next().is_some() {
        return Err(Error::InvalidSegmentFormat);
    }

    Ok(bytes)
}
