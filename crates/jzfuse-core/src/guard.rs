//! Write-once check
//!
//! Fuse bits only ever go from 0 to 1. Programming a byte that already
//! holds fused bits either burns a bit twice (`current & new != 0`) or
//! silently merges two values into one that neither caller asked for
//! (`current & !new != 0`). Both corrupt a committed value, so a byte may
//! only be programmed while it is still blank. Bytes the request leaves at
//! zero are not touched by the program cycle and may hold anything.

/// Index of the first byte of `new` that would re-program fused bits in
/// `current`, if any
pub fn first_conflict(current: &[u8], new: &[u8]) -> Option<usize> {
    current
        .iter()
        .zip(new)
        .position(|(&cur, &new)| new != 0 && cur != 0)
}

/// Whether `new` can be programmed over `current`
pub fn can_program(current: &[u8], new: &[u8]) -> bool {
    first_conflict(current, new).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_target() {
        assert!(can_program(&[0, 0, 0, 0], &[0xAA, 0xBB, 0xCC, 0xDD]));
        assert!(can_program(&[0; 32], &[0xFF; 32]));
    }

    #[test]
    fn test_same_pattern_twice() {
        let p = [0xAA, 0xBB, 0xCC, 0xDD];
        assert_eq!(first_conflict(&p, &p), Some(0));
    }

    #[test]
    fn test_overlapping_bits() {
        assert_eq!(first_conflict(&[0x00, 0x80], &[0x01, 0x81]), Some(1));
    }

    #[test]
    fn test_altering_fused_byte() {
        // 0xAA & 0x01 == 0, but the result would read back as 0xAB
        assert_eq!(
            first_conflict(&[0xAA, 0xBB, 0xCC, 0xDD], &[0x01, 0x00, 0x00, 0x00]),
            Some(0)
        );
    }

    #[test]
    fn test_disjoint_bits_on_fused_byte() {
        assert!(!can_program(&[0x02], &[0x01]));
        assert!(!can_program(&[0x00, 0x80], &[0x00, 0x7F]));
    }

    #[test]
    fn test_zero_bytes_skip_fused() {
        assert!(can_program(&[0xAA, 0x00, 0xCC], &[0x00, 0x5A, 0x00]));
    }
}
