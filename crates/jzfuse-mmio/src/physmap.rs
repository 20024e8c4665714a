//! Physical memory mapping of the EFUSE register window
//!
//! The window is mapped through `/dev/mem` with `O_SYNC` so that every
//! access goes straight to the controller.
//!
//! # Safety
//!
//! Accessing physical memory is inherently unsafe and requires root
//! privileges. The caller is responsible for pointing the mapping at the
//! EFUSE controller and nothing else.

use jzfuse_core::hal::RegisterBus;

use crate::error::{MmioError, Result};

/// A mapped EFUSE register window
#[cfg(target_os = "linux")]
pub struct PhysMap {
    /// Pointer to the start of the window
    ptr: *mut u8,
    /// Bytes of the window callers may touch
    window: usize,
    /// Size of the page-aligned mapping
    map_size: usize,
    /// Offset of the window inside the first page
    page_offset: usize,
    /// Physical address (for error reporting)
    phys_addr: u64,
}

#[cfg(target_os = "linux")]
impl PhysMap {
    /// Map `window` bytes of physical memory at `phys_addr`
    pub fn new(phys_addr: u64, window: usize) -> Result<Self> {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        if phys_addr & 3 != 0 {
            return Err(MmioError::Unaligned(phys_addr));
        }

        // O_SYNC for uncached access
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")
            .map_err(|source| MmioError::OpenFailed {
                path: "/dev/mem",
                source,
            })?;

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let page_mask = page_size - 1;
        let page_offset = (phys_addr as usize) & page_mask;
        let aligned_addr = phys_addr & !(page_mask as u64);
        let map_size = (window + page_offset + page_mask) & !page_mask;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                aligned_addr as libc::off_t,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(MmioError::MapFailed {
                address: phys_addr,
                size: window,
                source: std::io::Error::last_os_error(),
            });
        }

        log::debug!(
            "mmio: mapped {:#x}+{:#x} ({} bytes from {:#x})",
            phys_addr,
            window,
            map_size,
            aligned_addr
        );

        Ok(Self {
            ptr: unsafe { (ptr as *mut u8).add(page_offset) },
            window,
            map_size,
            page_offset,
            phys_addr,
        })
    }

    /// Physical address of the window
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Size of the window
    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(target_os = "linux")]
impl RegisterBus for PhysMap {
    #[inline]
    fn read32(&mut self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.window, "register {:#x} outside window", offset);
        debug_assert!(offset & 3 == 0, "unaligned 32-bit read");
        unsafe { core::ptr::read_volatile(self.ptr.add(offset) as *const u32) }
    }

    #[inline]
    fn write32(&mut self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.window, "register {:#x} outside window", offset);
        debug_assert!(offset & 3 == 0, "unaligned 32-bit write");
        unsafe { core::ptr::write_volatile(self.ptr.add(offset) as *mut u32, value) }
    }
}

#[cfg(target_os = "linux")]
impl Drop for PhysMap {
    fn drop(&mut self) {
        unsafe {
            let base = self.ptr.sub(self.page_offset);
            libc::munmap(base as *mut libc::c_void, self.map_size);
        }
    }
}

// MMIO registers don't have the usual memory aliasing concerns, and the
// engine serializes every access behind its register lock
#[cfg(target_os = "linux")]
unsafe impl Send for PhysMap {}

// Stub for non-Linux platforms
#[cfg(not(target_os = "linux"))]
pub struct PhysMap {
    _private: (),
}

#[cfg(not(target_os = "linux"))]
impl PhysMap {
    /// Always fails: `/dev/mem` is Linux only
    pub fn new(_phys_addr: u64, _window: usize) -> Result<Self> {
        Err(MmioError::NotSupported(
            "Physical memory mapping only supported on Linux",
        ))
    }

    /// Physical address of the window
    pub fn phys_addr(&self) -> u64 {
        0
    }

    /// Size of the window
    pub fn window(&self) -> usize {
        0
    }
}

#[cfg(not(target_os = "linux"))]
impl RegisterBus for PhysMap {
    fn read32(&mut self, _offset: usize) -> u32 {
        0
    }

    fn write32(&mut self, _offset: usize, _value: u32) {}
}
