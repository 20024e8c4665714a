//! Splitting byte ranges into hardware transfer quanta
//!
//! One controller transaction moves at most the eight data buffer words
//! (32 bytes). Shorter transfers must be whole words, except for a final
//! 1-3 byte tail which the controller handles as a masked partial word.

/// Largest number of bytes moved by one transaction
pub const MAX_QUANTUM: usize = 32;

/// Size of the next quantum for `remaining` bytes
pub fn quantum_size(remaining: usize) -> usize {
    if remaining >= MAX_QUANTUM {
        MAX_QUANTUM
    } else if remaining / 4 > 0 {
        (remaining / 4) * 4
    } else {
        remaining % 4
    }
}

/// One hardware transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantum {
    /// Offset within the array
    pub offset: usize,
    /// Number of bytes (1..=32)
    pub len: usize,
}

/// Lazy sequence of quanta covering `[offset, offset + len)`
///
/// Each step is computed from the remaining byte count, so quanta are
/// produced in increasing address order and always sum to `len`.
#[derive(Debug, Clone)]
pub struct Quanta {
    offset: usize,
    remaining: usize,
}

impl Quanta {
    /// Create a sequence for the given range
    pub fn new(offset: usize, len: usize) -> Self {
        Self {
            offset,
            remaining: len,
        }
    }

    /// Bytes not yet covered by a yielded quantum
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Iterator for Quanta {
    type Item = Quantum;

    fn next(&mut self) -> Option<Quantum> {
        if self.remaining == 0 {
            return None;
        }

        let len = quantum_size(self.remaining);
        let q = Quantum {
            offset: self.offset,
            len,
        };
        self.offset += len;
        self.remaining -= len;
        Some(q)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // At most one full-size run, one word run and one tail
        let full = self.remaining / MAX_QUANTUM;
        let rest = self.remaining % MAX_QUANTUM;
        let n = full + usize::from(rest >= 4) + usize::from(rest % 4 != 0);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Quanta {}

impl core::iter::FusedIterator for Quanta {}
