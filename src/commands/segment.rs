//! Segment commands

use std::error::Error;

use jzfuse_core::segment::{self, Segment, SEGMENTS};

use crate::backends::EfuseHandle;
use crate::commands::hexdump;

/// Print the segment map
pub fn list_segments() {
    println!("{:<16} {:>7} {:>7}  Description", "Name", "Offset", "Size");
    for seg in SEGMENTS {
        println!(
            "{:<16} {:>#7x} {:>7}  {}",
            seg.name, seg.offset, seg.len, seg.description
        );
    }
}

/// Show an ID segment, or program it when `value` is given
pub fn run_id(
    efuse: &EfuseHandle,
    seg: &Segment,
    value: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    if let Some(value) = value {
        log::warn!("Programming {}, this cannot be undone", seg.name);
        efuse.store_id(seg, value)?;
    }

    println!("{}", efuse.show_id(seg)?);
    Ok(())
}

/// Hex dump a segment by name
pub fn run_segment(efuse: &EfuseHandle, name: &str) -> Result<(), Box<dyn Error>> {
    let seg = segment::find(name)?;
    let data = efuse.read_segment(seg)?;
    println!("{} ({})", seg.name, seg.description);
    print!("{}", hexdump(seg.offset, &data));
    Ok(())
}
