//! Write command implementation

use std::error::Error;
use std::fs;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::backends::EfuseHandle;

/// Run the write command
///
/// Programs `input` at `offset`, then reads the range back and checks that
/// every requested bit is set.
pub fn run_write(efuse: &EfuseHandle, offset: usize, input: &Path) -> Result<(), Box<dyn Error>> {
    let data = fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);

    log::warn!(
        "Programming {} bytes at 0x{:03x}, this cannot be undone",
        data.len(),
        offset
    );

    let mut file = efuse.open();
    file.seek(SeekFrom::Start(offset as u64))?;
    if let Err(e) = file.write_fuses(&data) {
        let done = file.position() - offset as u64;
        eprintln!("Programmed {} of {} bytes before the error", done, data.len());
        return Err(e.into());
    }
    drop(file);

    let mismatches = verify(&efuse.read_range(offset, data.len())?, &data);
    if mismatches > 0 {
        return Err(format!("Verification failed: {} byte(s) differ", mismatches).into());
    }

    println!("Programmed and verified {} bytes at 0x{:03x}", data.len(), offset);
    Ok(())
}

/// Number of bytes of `expected` whose bits did not all stick
fn verify(readback: &[u8], expected: &[u8]) -> usize {
    readback
        .iter()
        .zip(expected)
        .filter(|&(&got, &want)| got & want != want)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support;
    use jzfuse_dummy::DummyEfuse;

    fn temp_file(name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("jzfuse-{}-{}.bin", name, std::process::id()));
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_verify() {
        assert_eq!(verify(&[0xFF, 0x0F], &[0xAA, 0x0F]), 0);
        assert_eq!(verify(&[0x00, 0x0F], &[0x01, 0x1F]), 2);
    }

    #[test]
    fn test_write_file() {
        let hw = DummyEfuse::new();
        let efuse = test_support::attach(&hw);
        let path = temp_file("write", &[0x10, 0x20, 0x30, 0x40, 0x50]);

        run_write(&efuse, 0x200, &path).unwrap();
        assert_eq!(&hw.fuses()[0x200..0x205], &[0x10, 0x20, 0x30, 0x40, 0x50]);

        // Second attempt trips the write-once check
        assert!(run_write(&efuse, 0x200, &path).is_err());
        let _ = fs::remove_file(&path);
        assert_eq!(efuse.use_count(), 0);
    }
}
