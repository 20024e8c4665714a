//! CLI command implementations
//!
//! Every command takes an attached [`EfuseHandle`](crate::backends::EfuseHandle)
//! except `segments`, which only prints the static segment map.

mod info;
mod read;
mod segment;
mod write;

pub use info::run_info;
pub use read::{hexdump, run_read};
pub use segment::{list_segments, run_id, run_segment};
pub use write::run_write;
