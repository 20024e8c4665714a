//! Read command implementation

use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use jzfuse_core::EFUSE_SIZE;

use crate::backends::EfuseHandle;

/// Bytes per hex dump line
const DUMP_WIDTH: usize = 16;

/// Run the read command
pub fn run_read(
    efuse: &EfuseHandle,
    offset: usize,
    length: Option<usize>,
    output: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let len = length.unwrap_or(EFUSE_SIZE.saturating_sub(offset));
    if offset.checked_add(len).map_or(true, |end| end > EFUSE_SIZE) {
        return Err(format!(
            "Range 0x{:X}+{} exceeds the {}-byte EFUSE array",
            offset, len, EFUSE_SIZE
        )
        .into());
    }

    let mut file = efuse.open();
    file.seek(SeekFrom::Start(offset as u64))?;
    let mut data = vec![0u8; len];
    file.read_fuses(&mut data)?;

    match output {
        Some(path) => {
            fs::write(path, &data)?;
            println!("Wrote {} bytes to {:?}", data.len(), path);
        }
        None => print!("{}", hexdump(offset, &data)),
    }

    Ok(())
}

/// Format `data` as a hex dump with array offsets starting at `base`
pub fn hexdump(base: usize, data: &[u8]) -> String {
    let mut out = String::new();

    for (i, line) in data.chunks(DUMP_WIDTH).enumerate() {
        let _ = write!(out, "{:03x}:", base + i * DUMP_WIDTH);
        for byte in line {
            let _ = write!(out, " {:02x}", byte);
        }
        for _ in line.len()..DUMP_WIDTH {
            out.push_str("   ");
        }
        out.push_str("  |");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support;
    use jzfuse_dummy::DummyEfuse;

    #[test]
    fn test_hexdump() {
        let dump = hexdump(0x20, b"JZ4780\x00\xff");
        assert_eq!(
            dump,
            "020: 4a 5a 34 37 38 30 00 ff                          |JZ4780..|\n"
        );

        let dump = hexdump(0, &[0u8; 20]);
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.lines().nth(1).unwrap().starts_with("010: 00 00 00 00   "));
        assert_eq!(hexdump(0, &[]), "");
    }

    #[test]
    fn test_read_to_file() {
        let mut image = vec![0u8; EFUSE_SIZE];
        image[0x3F0..].copy_from_slice(&[0xEE; 16]);
        let hw = DummyEfuse::with_data(&image);
        let efuse = test_support::attach(&hw);

        let path = std::env::temp_dir().join(format!("jzfuse-read-{}.bin", std::process::id()));
        run_read(&efuse, 0x3E0, None, Some(&path)).unwrap();
        let data = fs::read(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(data.len(), 32);
        assert_eq!(&data[..16], &[0; 16]);
        assert_eq!(&data[16..], &[0xEE; 16]);
        assert_eq!(efuse.use_count(), 0);
    }

    #[test]
    fn test_read_out_of_range() {
        let hw = DummyEfuse::new();
        let efuse = test_support::attach(&hw);
        assert!(run_read(&efuse, 0x3F0, Some(0x20), None).is_err());
        assert!(run_read(&efuse, 0x400, Some(1), None).is_err());
    }

    #[test]
    fn test_read_huge_length() {
        let hw = DummyEfuse::new();
        let efuse = test_support::attach(&hw);

        let err = run_read(&efuse, 0, Some(usize::MAX), None).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        let err = run_read(&efuse, usize::MAX, Some(2), None).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
        assert_eq!(hw.stats().reads, 0);
        assert_eq!(efuse.use_count(), 0);
    }
}
