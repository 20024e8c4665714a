//! Info command implementation

use std::error::Error;

use jzfuse_core::regs::State;
use jzfuse_core::{EFUSE_END_ADDR, EFUSE_SIZE, EFUSE_START_ADDR};

use crate::backends::EfuseHandle;

/// Print timing profile, protection bits and engine state
pub fn run_info(efuse: &EfuseHandle) -> Result<(), Box<dyn Error>> {
    let p = efuse.profile();
    let b = &p.bounds;

    println!(
        "EFUSE size: {} bytes (hardware addresses {:#x}-{:#x})",
        EFUSE_SIZE, EFUSE_START_ADDR, EFUSE_END_ADDR
    );
    println!();
    println!("Timing:");
    println!("  rd_adj    = {:#x}  (min {:#x})", p.rd_adj, b.min_rd_adj);
    println!("  rd_strobe = {:#x}  (min adj+strobe {:#x})", p.rd_strobe, b.min_rd_adj_strobe);
    println!("  wr_adj    = {:#x}  (min {:#x})", p.wr_adj, b.min_wr_adj);
    println!(
        "  wr_strobe = {:#x}  (adj+strobe {:#x}..={:#x})",
        p.wr_strobe, b.min_wr_adj_strobe, b.max_wr_adj_strobe
    );
    println!();

    let prot = efuse.protection();
    println!("Protection:");
    println!("  global:      {}", yes_no(prot.contains(State::GLOBAL_PRT)));
    println!("  chip ID:     {}", yes_no(prot.contains(State::CHIPID_PRT)));
    println!("  customer ID: {}", yes_no(prot.contains(State::CUSTID_PRT)));
    println!();

    println!("Open handles:   {}", efuse.use_count());
    println!("VDDQ asserted:  {}", yes_no(efuse.vddq_asserted()));
    println!("Watchdog trips: {}", efuse.watchdog_trips());

    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
